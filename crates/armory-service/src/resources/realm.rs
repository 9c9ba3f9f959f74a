use serde::{Deserialize, Serialize};

use crate::types::ApiLink;

/// Entry in the realm index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealmEntry {
    pub key: ApiLink,
    pub name: String,
    pub id: i64,
    pub slug: String,
}

/// Full realm object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Realm {
    pub id: i64,
    pub region: RealmRegion,
    pub connected_realm: ApiLink,
    pub name: String,
    pub category: String,
    pub locale: String,
    pub timezone: String,
    #[serde(rename = "type")]
    pub kind: RealmKind,
    pub is_tournament: bool,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealmRegion {
    pub key: ApiLink,
    pub name: String,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealmKind {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}
