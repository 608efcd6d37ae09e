//! Print the OpenAPI document for the HTTP surface as pretty JSON.

use anyhow::Context;
use spectrum_back::services::documentation::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let doc = ApiDoc::openapi();
    let json = doc
        .to_pretty_json()
        .context("serializing the OpenAPI document")?;
    println!("{json}");
    Ok(())
}
