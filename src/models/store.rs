//! Store model
//!
//! A store is a named, geolocated place with tags, an optional photo and a
//! single author. Reviews are not part of the row; [`StoreDetail`] carries
//! them when a page needs them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ReviewWithAuthor, UserSummary};

/// GeoJSON geometry type of a store location. Only points exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointKind {
    #[default]
    Point,
}

/// Where a store is: a GeoJSON point plus a street address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type", default)]
    pub kind: PointKind,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
    pub address: String,
}

impl Location {
    pub fn new(lng: f64, lat: f64, address: impl Into<String>) -> Self {
        Self {
            kind: PointKind::Point,
            coordinates: [lng, lat],
            address: address.into(),
        }
    }

    pub fn lng(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }
}

/// Store entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    /// Unique identifier
    pub id: i64,
    pub name: String,
    /// Unique URL identifier derived from `name`
    pub slug: String,
    pub description: Option<String>,
    /// Tags in the order they were entered
    pub tags: Vec<String>,
    /// Creation timestamp, never changed after insert
    pub created: DateTime<Utc>,
    pub location: Location,
    /// File name of the uploaded photo
    pub photo: Option<String>,
    /// ID of the user who created the store
    #[serde(rename = "author")]
    pub author_id: i64,
}

/// Validated store fields for create and update.
///
/// There is no author field: the author is taken from the session on
/// create and never changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreInput {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub location: Location,
    /// New photo; `None` keeps the current one on update
    pub photo: Option<String>,
}

/// Store with its author and reviews resolved, for the detail page
#[derive(Debug, Clone, Serialize)]
pub struct StoreDetail {
    #[serde(flatten)]
    pub store: Store,
    pub author: Option<UserSummary>,
    /// Reviews, newest first
    pub reviews: Vec<ReviewWithAuthor>,
}

/// Reduced store projection used by the map endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub location: Location,
    pub photo: Option<String>,
}

impl From<Store> for StoreSummary {
    fn from(store: Store) -> Self {
        Self {
            id: store.id,
            slug: store.slug,
            name: store.name,
            description: store.description,
            location: store.location,
            photo: store.photo,
        }
    }
}

/// Search hit with its relevance score
#[derive(Debug, Clone, Serialize)]
pub struct ScoredStore {
    #[serde(flatten)]
    pub store: Store,
    pub score: f64,
}

/// Number of stores carrying a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

/// A row of the top-rated ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopStore {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub photo: Option<String>,
    pub review_count: i64,
    pub average_rating: f64,
}

/// One page of the store listing
#[derive(Debug, Clone, Serialize)]
pub struct StorePage {
    pub stores: Vec<Store>,
    /// 1-based page number that was requested
    pub page: i64,
    /// Total number of pages, `ceil(count / page_size)`
    pub pages: i64,
    /// Total number of stores
    pub count: i64,
}

impl StorePage {
    /// Requested page lies past the end of a non-empty listing
    pub fn is_out_of_range(&self) -> bool {
        self.stores.is_empty() && self.page > 1
    }
}

/// Trim tags, drop empty ones and duplicates, keep first-seen order
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !seen.iter().any(|t| t == tag) {
            seen.push(tag.to_string());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_serializes_as_point() {
        let location = Location::new(-79.38, 43.65, "1 Queen St");
        let json = serde_json::to_value(&location).unwrap();

        assert_eq!(json["type"], "Point");
        assert_eq!(json["coordinates"][0], -79.38);
        assert_eq!(json["coordinates"][1], 43.65);
        assert_eq!(json["address"], "1 Queen St");
    }

    #[test]
    fn test_location_rejects_other_geometry_types() {
        let result: Result<Location, _> = serde_json::from_str(
            r#"{"type":"Polygon","coordinates":[1.0,2.0],"address":"x"}"#,
        );
        assert!(result.is_err());

        let missing_type: Location =
            serde_json::from_str(r#"{"coordinates":[1.0,2.0],"address":"x"}"#).unwrap();
        assert_eq!(missing_type.kind, PointKind::Point);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(["Wifi", " Family Friendly ", "", "Wifi", "Vegetarian"]);
        assert_eq!(tags, vec!["Wifi", "Family Friendly", "Vegetarian"]);
    }

    #[test]
    fn test_store_page_out_of_range() {
        let page = StorePage {
            stores: vec![],
            page: 5,
            pages: 2,
            count: 8,
        };
        assert!(page.is_out_of_range());

        let first = StorePage {
            stores: vec![],
            page: 1,
            pages: 0,
            count: 0,
        };
        assert!(!first.is_out_of_range());
    }
}
