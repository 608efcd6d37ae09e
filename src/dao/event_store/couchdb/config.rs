use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "spectrum_events";

/// Runtime configuration describing how to reach the CouchDB event database.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CouchConfig {
    /// Construct a configuration from explicit base URL and database name.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            username: None,
            password: None,
        }
    }

    /// Attach basic-auth credentials to the configuration.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB` (defaults to
    /// `spectrum_events`) and the optional `COUCH_USERNAME`/`COUCH_PASSWORD` pair.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = non_empty_var("COUCH_BASE_URL").ok_or(CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;
        let database = non_empty_var("COUCH_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_owned());

        let config = Self::new(base_url.trim_end_matches('/'), database);
        Ok(
            match (non_empty_var("COUCH_USERNAME"), non_empty_var("COUCH_PASSWORD")) {
                (Some(username), Some(password)) => config.with_credentials(username, password),
                _ => config,
            },
        )
    }

    /// `<base_url>/<database>`
    pub(crate) fn database_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.database)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_url_ignores_trailing_slash() {
        let config = CouchConfig::new("http://couch:5984/", "events").with_credentials("admin", "pw");
        assert_eq!(config.database_url(), "http://couch:5984/events");
        assert_eq!(config.username.as_deref(), Some("admin"));
    }
}
