//! Query builders for cached entities.
//!
//! Each builder describes one "query shape": a set of column filters plus an
//! optional case-insensitive text match. The same shape drives one-off reads
//! ([`Store::query_places`](crate::Store::query_places)), live streams
//! ([`CacheStore::watch_places`](crate::CacheStore::watch_places)) and
//! partition replacement after a filtered network refresh.
//!
//! # Example
//!
//! ```
//! use campus_store::{Store, PlaceQuery};
//!
//! let store = Store::open_in_memory()?;
//! let labs = PlaceQuery::new().building(3).search("lab");
//! let places = store.query_places(&labs)?;
//! assert!(places.is_empty());
//! # Ok::<(), campus_store::Error>(())
//! ```

use campus_types::{Building, EntityId, Event, EventType, Place};

type SqlParams = Vec<Box<dyn rusqlite::ToSql>>;

fn where_clause(conditions: &[&str]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

/// Case-insensitive substring match. An empty needle matches everything.
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Query shape for cached buildings.
///
/// Text search matches `name` and `code`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BuildingQuery {
    /// Filter by category.
    pub category: Option<String>,
    /// Case-insensitive substring over name and code.
    pub text: Option<String>,
}

impl BuildingQuery {
    /// All buildings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by category.
    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Filter by text.
    pub fn search(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Whether the query selects every row.
    pub fn is_unfiltered(&self) -> bool {
        self.category.is_none() && self.text.is_none()
    }

    pub(crate) fn build_where(&self) -> (String, SqlParams) {
        let mut conditions = Vec::new();
        let mut params: SqlParams = Vec::new();

        if let Some(ref category) = self.category {
            conditions.push("category = ?");
            params.push(Box::new(category.clone()));
        }

        (where_clause(&conditions), params)
    }

    pub(crate) fn matches_text(&self, building: &Building) -> bool {
        match self.text.as_deref() {
            None => true,
            Some(text) => contains_ci(&building.name, text) || contains_ci(&building.code, text),
        }
    }
}

/// Query shape for cached places.
///
/// Text search matches `name` only.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlaceQuery {
    /// Filter by owning building.
    pub building_id: Option<EntityId>,
    /// Filter by category.
    pub category: Option<String>,
    /// Case-insensitive substring over name.
    pub text: Option<String>,
}

impl PlaceQuery {
    /// All places.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only places belonging to this building.
    pub fn building(mut self, building_id: EntityId) -> Self {
        self.building_id = Some(building_id);
        self
    }

    /// Filter by category.
    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Filter by text.
    pub fn search(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Whether the query selects every row.
    pub fn is_unfiltered(&self) -> bool {
        self.building_id.is_none() && self.category.is_none() && self.text.is_none()
    }

    pub(crate) fn build_where(&self) -> (String, SqlParams) {
        let mut conditions = Vec::new();
        let mut params: SqlParams = Vec::new();

        if let Some(building_id) = self.building_id {
            conditions.push("building_id = ?");
            params.push(Box::new(building_id));
        }

        if let Some(ref category) = self.category {
            conditions.push("category = ?");
            params.push(Box::new(category.clone()));
        }

        (where_clause(&conditions), params)
    }

    pub(crate) fn matches_text(&self, place: &Place) -> bool {
        match self.text.as_deref() {
            None => true,
            Some(text) => contains_ci(&place.name, text),
        }
    }
}

/// Query shape for cached events.
///
/// Text search matches `title` only.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EventQuery {
    /// Filter by event type.
    pub event_type: Option<EventType>,
    /// Case-insensitive substring over title.
    pub text: Option<String>,
}

impl EventQuery {
    /// All events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by event type.
    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Filter by text.
    pub fn search(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Whether the query selects every row.
    pub fn is_unfiltered(&self) -> bool {
        self.event_type.is_none() && self.text.is_none()
    }

    pub(crate) fn build_where(&self) -> (String, SqlParams) {
        let mut conditions = Vec::new();
        let mut params: SqlParams = Vec::new();

        if let Some(event_type) = self.event_type {
            conditions.push("event_type = ?");
            params.push(Box::new(event_type.as_str()));
        }

        (where_clause(&conditions), params)
    }

    pub(crate) fn matches_text(&self, event: &Event) -> bool {
        match self.text.as_deref() {
            None => true,
            Some(text) => contains_ci(&event.title, text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_ci() {
        assert!(contains_ci("Laboratorio Colivri", "lab"));
        assert!(contains_ci("ÁGORA", "ágora"));
        assert!(!contains_ci("CupiTaller", "lab"));
        assert!(contains_ci("anything", ""));
    }

    #[test]
    fn test_building_query_defaults() {
        let query = BuildingQuery::new();
        assert!(query.is_unfiltered());
        let (sql, params) = query.build_where();
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_building_query_matches_name_or_code() {
        let building = Building {
            id: 1,
            name: "Mario Laserna".to_string(),
            code: "ML".to_string(),
            description: None,
            latitude: 0.0,
            longitude: 0.0,
            image_url: None,
            category: "academic".to_string(),
        };
        assert!(BuildingQuery::new().search("ml").matches_text(&building));
        assert!(BuildingQuery::new().search("laser").matches_text(&building));
        assert!(!BuildingQuery::new().search("sd").matches_text(&building));
    }

    #[test]
    fn test_place_query_chaining() {
        let query = PlaceQuery::new().building(3).category("lab").search("col");
        assert_eq!(query.building_id, Some(3));
        assert_eq!(query.category.as_deref(), Some("lab"));
        assert!(!query.is_unfiltered());

        let (sql, params) = query.build_where();
        assert_eq!(sql, "WHERE building_id = ? AND category = ?");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_place_query_text_ignores_code() {
        let place = Place {
            id: 1,
            name: "CupiTaller".to_string(),
            code: Some("ML-501".to_string()),
            ..Default::default()
        };
        assert!(!PlaceQuery::new().search("ml").matches_text(&place));
        assert!(PlaceQuery::new().search("cupi").matches_text(&place));
    }

    #[test]
    fn test_event_query_type_filter() {
        let (sql, params) = EventQuery::new().event_type(EventType::Sports).build_where();
        assert_eq!(sql, "WHERE event_type = ?");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_search_only_query_has_no_where() {
        let (sql, _) = EventQuery::new().search("cine").build_where();
        assert!(sql.is_empty());
    }
}
