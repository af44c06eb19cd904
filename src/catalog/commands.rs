use crate::core::{DirectorId, GenreId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One field of a partial update: either left alone or set to a value.
///
/// An empty string or empty list is a value like any other, so
/// `Set(String::new())` clears a title while `Unset` keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Unset,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unset
    }
}

impl<T> Patch<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Patch::Unset)
    }

    /// Overwrite `target` when set.
    pub fn apply_to(self, target: &mut T) {
        if let Patch::Set(value) = self {
            *target = value;
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Patch::Set(value),
            None => Patch::Unset,
        }
    }
}

// A field that is present decodes as `Set`; a missing field falls back to
// `Unset` through `#[serde(default)]` on the containing struct.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Set(value) => value.serialize(serializer),
            Patch::Unset => serializer.serialize_none(),
        }
    }
}

/// Input of the create pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMovie {
    pub title: String,
    pub description: String,
    pub director_id: DirectorId,
    #[serde(default)]
    pub genre_ids: Vec<GenreId>,
}

impl NewMovie {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        director_id: DirectorId,
        genre_ids: impl IntoIterator<Item = GenreId>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            director_id,
            genre_ids: genre_ids.into_iter().collect(),
        }
    }
}

/// Input of the update pipeline. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MoviePatch {
    #[serde(skip_serializing_if = "Patch::is_unset")]
    pub title: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unset")]
    pub description: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unset")]
    pub director_id: Patch<DirectorId>,
    #[serde(skip_serializing_if = "Patch::is_unset")]
    pub genre_ids: Patch<Vec<GenreId>>,
}

impl MoviePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Patch::Set(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Patch::Set(description.into());
        self
    }

    pub fn director_id(mut self, director_id: DirectorId) -> Self {
        self.director_id = Patch::Set(director_id);
        self
    }

    pub fn genre_ids(mut self, genre_ids: impl IntoIterator<Item = GenreId>) -> Self {
        self.genre_ids = Patch::Set(genre_ids.into_iter().collect());
        self
    }

    /// True when applying the patch would change nothing but the movie's
    /// version stamp.
    pub fn is_empty(&self) -> bool {
        self.title.is_unset()
            && self.description.is_unset()
            && self.director_id.is_unset()
            && self.genre_ids.is_unset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_decode_as_unset() {
        let patch: MoviePatch = serde_json::from_str(r#"{"description":"dream heist"}"#).unwrap();
        assert_eq!(patch.description, Patch::Set("dream heist".to_string()));
        assert!(patch.title.is_unset());
        assert!(patch.director_id.is_unset());
        assert!(patch.genre_ids.is_unset());
    }

    #[test]
    fn test_empty_values_are_still_set() {
        let patch: MoviePatch = serde_json::from_str(r#"{"title":"","genreIds":[]}"#).unwrap();
        assert_eq!(patch.title, Patch::Set(String::new()));
        assert_eq!(patch.genre_ids, Patch::Set(Vec::new()));
    }

    #[test]
    fn test_null_is_rejected() {
        assert!(serde_json::from_str::<MoviePatch>(r#"{"title":null}"#).is_err());
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = MoviePatch::new().genre_ids([GenreId(3)]);
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"genreIds":[3]}"#);
        assert!(!patch.is_empty());
        assert!(MoviePatch::new().is_empty());
    }

    #[test]
    fn test_new_movie_accepts_camel_case() {
        let movie: NewMovie = serde_json::from_str(
            r#"{"title":"Inception","description":"dream heist","directorId":1,"genreIds":[2,3]}"#,
        )
        .unwrap();
        assert_eq!(
            movie,
            NewMovie::new("Inception", "dream heist", DirectorId(1), [GenreId(2), GenreId(3)])
        );
    }

    #[test]
    fn test_apply_to() {
        let mut title = "Old".to_string();
        Patch::Unset.apply_to(&mut title);
        assert_eq!(title, "Old");
        Patch::Set("New".to_string()).apply_to(&mut title);
        assert_eq!(title, "New");
    }
}
