//! Diesel ORM models for the `extensions` table.

use diesel::prelude::*;

use crate::schema;

/// Extension row as stored.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::extensions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ExtensionRow {
    pub id: i32,
    pub identifier: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    pub downloads: Option<i64>,
    pub installs: Option<i64>,
    pub last_updated: Option<String>,
    pub categories: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<String>,
    pub tags: Option<String>,
    pub repository: Option<String>,
    pub license: Option<String>,
    pub local_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub is_created: i32,
}

/// New extension for insertion. Always starts out not archived.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::extensions)]
pub struct NewExtension<'a> {
    pub identifier: &'a str,
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub version: Option<&'a str>,
    pub author: Option<&'a str>,
    pub url: Option<&'a str>,
    pub downloads: Option<i64>,
    pub installs: Option<i64>,
    pub last_updated: Option<String>,
    pub categories: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<&'a str>,
    pub tags: Option<String>,
    pub repository: Option<&'a str>,
    pub license: Option<&'a str>,
    pub local_path: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
    pub is_created: i32,
}

/// Metadata columns replaced when a known extension is refreshed.
/// `local_path` and `is_created` are not part of it.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = schema::extensions)]
#[diesel(treat_none_as_null = true)]
pub struct ExtensionMetadataChangeset<'a> {
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub version: Option<&'a str>,
    pub author: Option<&'a str>,
    pub url: Option<&'a str>,
    pub downloads: Option<i64>,
    pub installs: Option<i64>,
    pub last_updated: Option<String>,
    pub categories: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<&'a str>,
    pub tags: Option<String>,
    pub repository: Option<&'a str>,
    pub license: Option<&'a str>,
    pub updated_at: &'a str,
}
