use std::{collections::BTreeMap, fmt};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, SeqAccess, Visitor},
    ser::SerializeMap,
};

use crate::dao::models::Answer;

/// Answers of one participant keyed by question index.
///
/// Two encodings exist in stored documents: a sparse map with stringified
/// indices (`{"16": 1}`) and a dense array using `null` for unanswered
/// questions (`[null, 1, 0]`). Both decode into the same value; writes always
/// use the sparse map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answers(BTreeMap<usize, Answer>);

impl Answers {
    pub fn get(&self, index: usize) -> Option<Answer> {
        self.0.get(&index).copied()
    }

    pub fn set(&mut self, index: usize, answer: Answer) {
        self.0.insert(index, answer);
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Answer)> + '_ {
        self.0.iter().map(|(index, answer)| (*index, *answer))
    }

    /// Indices that carry an answer, in ascending order.
    pub fn answered_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(usize, Answer)> for Answers {
    fn from_iter<T: IntoIterator<Item = (usize, Answer)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for Answers {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (index, answer) in &self.0 {
            map.serialize_entry(&index.to_string(), answer)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Answers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AnswersVisitor)
    }
}

struct AnswersVisitor;

impl<'de> Visitor<'de> for AnswersVisitor {
    type Value = Answers;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an answer map keyed by question index or an answer array")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Answers, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut answers = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, Option<Answer>>()? {
            let index = key.trim().parse::<usize>().map_err(|_| {
                serde::de::Error::custom(format!("invalid question index `{key}`"))
            })?;
            if let Some(answer) = value {
                answers.insert(index, answer);
            }
        }
        Ok(Answers(answers))
    }

    fn visit_seq<A>(self, mut access: A) -> Result<Answers, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut answers = BTreeMap::new();
        let mut index = 0;
        while let Some(value) = access.next_element::<Option<Answer>>()? {
            if let Some(answer) = value {
                answers.insert(index, answer);
            }
            index += 1;
        }
        Ok(Answers(answers))
    }

    fn visit_unit<E>(self) -> Result<Answers, E>
    where
        E: serde::de::Error,
    {
        Ok(Answers::default())
    }

    fn visit_none<E>(self) -> Result<Answers, E>
    where
        E: serde::de::Error,
    {
        Ok(Answers::default())
    }
}
