use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CrudError;

/// Endpoint kinds an [`EndpointCreator`](crate::api::EndpointCreator) can register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrudMethod {
    Create,
    Read,
    ReadMulti,
    ReadPaginated,
    Update,
    Delete,
    DbDelete,
}

impl CrudMethod {
    pub const ALL: [CrudMethod; 7] = [
        CrudMethod::Create,
        CrudMethod::Read,
        CrudMethod::ReadMulti,
        CrudMethod::ReadPaginated,
        CrudMethod::Update,
        CrudMethod::Delete,
        CrudMethod::DbDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrudMethod::Create => "create",
            CrudMethod::Read => "read",
            CrudMethod::ReadMulti => "read_multi",
            CrudMethod::ReadPaginated => "read_paginated",
            CrudMethod::Update => "update",
            CrudMethod::Delete => "delete",
            CrudMethod::DbDelete => "db_delete",
        }
    }

    pub fn default_endpoint_name(&self) -> &'static str {
        match self {
            CrudMethod::Create => "create",
            CrudMethod::Read => "get",
            CrudMethod::ReadMulti => "get_multi",
            CrudMethod::ReadPaginated => "get_paginated",
            CrudMethod::Update => "update",
            CrudMethod::Delete => "delete",
            CrudMethod::DbDelete => "db_delete",
        }
    }

    pub fn http_method(&self) -> &'static str {
        match self {
            CrudMethod::Create => "POST",
            CrudMethod::Read | CrudMethod::ReadMulti | CrudMethod::ReadPaginated => "GET",
            CrudMethod::Update => "PATCH",
            CrudMethod::Delete | CrudMethod::DbDelete => "DELETE",
        }
    }

    /// Whether the route addresses a single row by primary key
    pub fn takes_primary_key(&self) -> bool {
        matches!(
            self,
            CrudMethod::Read | CrudMethod::Update | CrudMethod::Delete | CrudMethod::DbDelete
        )
    }
}

impl fmt::Display for CrudMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrudMethod {
    type Err = CrudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrudMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| CrudError::config(format!("Invalid CRUD method: {}", s)))
    }
}
