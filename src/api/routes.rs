use axum::{
    routing::{delete, get, patch, post, MethodRouter},
    Router,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::api::filters::FilterConfig;
use crate::api::handlers::{self, AppState, ResourceState};
use crate::api::methods::CrudMethod;
use crate::error::{CrudError, Result};
use crate::logic::{Crud, QueryAssembler};
use crate::model::{JoinSpec, QueryRequest, Schema};
use crate::store::traits::RowStore;

/// One registered route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub method: CrudMethod,
    pub http_method: &'static str,
    pub path: String,
}

/// Builds the CRUD routes of one resource.
///
/// ```ignore
/// let router = EndpointCreator::new(crud, create_schema, update_schema)
///     .path("/items")
///     .endpoint_name(CrudMethod::Read, "fetch")
///     .deleted_methods(["db_delete"])
///     .into_router(store)?;
/// ```
#[derive(Debug, Clone)]
pub struct EndpointCreator {
    path: String,
    crud: Crud,
    create_schema: Arc<dyn Schema>,
    update_schema: Arc<dyn Schema>,
    read_schema: Option<Arc<dyn Schema>>,
    db_delete: bool,
    endpoint_names: HashMap<CrudMethod, String>,
    included_methods: Option<Vec<String>>,
    deleted_methods: Option<Vec<String>>,
    joins: Option<Vec<JoinSpec>>,
    nest_joins: bool,
    filter_config: FilterConfig,
}

impl EndpointCreator {
    pub fn new(crud: Crud, create_schema: Arc<dyn Schema>, update_schema: Arc<dyn Schema>) -> Self {
        Self {
            path: format!("/{}", crud.entity().table()),
            crud,
            create_schema,
            update_schema,
            read_schema: None,
            db_delete: false,
            endpoint_names: HashMap::new(),
            included_methods: None,
            deleted_methods: None,
            joins: None,
            nest_joins: false,
            filter_config: FilterConfig::default(),
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Restricts the columns returned by the read endpoints
    pub fn read_schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.read_schema = Some(schema);
        self
    }

    /// Registers the hard-delete endpoint
    pub fn with_db_delete(mut self) -> Self {
        self.db_delete = true;
        self
    }

    pub fn endpoint_name(mut self, method: CrudMethod, name: impl Into<String>) -> Self {
        self.endpoint_names.insert(method, name.into());
        self
    }

    pub fn included_methods<I, T>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.included_methods = Some(methods.into_iter().map(Into::into).collect());
        self
    }

    pub fn deleted_methods<I, T>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.deleted_methods = Some(methods.into_iter().map(Into::into).collect());
        self
    }

    /// Serve the read endpoints through the joined pipeline
    pub fn with_joins(mut self, joins: Vec<JoinSpec>, nest: bool) -> Self {
        self.joins = Some(joins);
        self.nest_joins = nest;
        self
    }

    /// Query parameters `get_multi` and `get_paginated` filter on
    pub fn filter_config(mut self, config: FilterConfig) -> Self {
        self.filter_config = config;
        self
    }

    fn parse_methods(names: &[String]) -> Result<Vec<CrudMethod>> {
        names.iter().map(|name| name.parse()).collect()
    }

    fn selected_methods(&self) -> Result<Vec<CrudMethod>> {
        let included = match (&self.included_methods, &self.deleted_methods) {
            (Some(_), Some(_)) => {
                return Err(CrudError::config(
                    "Cannot use both 'included_methods' and 'deleted_methods' simultaneously.",
                ))
            }
            (Some(included), None) => Self::parse_methods(included)?,
            (None, _) => CrudMethod::ALL.to_vec(),
        };
        let deleted = match &self.deleted_methods {
            Some(deleted) => Self::parse_methods(deleted)?,
            None => Vec::new(),
        };

        Ok(CrudMethod::ALL
            .into_iter()
            .filter(|m| included.contains(m) && !deleted.contains(m))
            .filter(|m| *m != CrudMethod::DbDelete || self.db_delete)
            .collect())
    }

    fn route_path(&self, method: CrudMethod) -> String {
        let base = self.path.trim_end_matches('/');
        let name = self
            .endpoint_names
            .get(&method)
            .map(String::as_str)
            .unwrap_or_else(|| method.default_endpoint_name())
            .trim_matches('/');

        let mut path = String::new();
        if !base.is_empty() {
            if !base.starts_with('/') {
                path.push('/');
            }
            path.push_str(base);
        }
        if !name.is_empty() {
            path.push('/');
            path.push_str(name);
        }
        if method.takes_primary_key() {
            for key in self.crud.entity().primary_key() {
                path.push_str("/:");
                path.push_str(key);
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    /// Routes this creator would register, in registration order
    pub fn routes(&self) -> Result<Vec<RouteEntry>> {
        let mut seen = HashSet::new();
        let mut routes = Vec::new();
        for method in self.selected_methods()? {
            let entry = RouteEntry {
                method,
                http_method: method.http_method(),
                path: self.route_path(method),
            };
            if !seen.insert((entry.http_method, entry.path.clone())) {
                return Err(CrudError::config(format!(
                    "Endpoint {} {} is registered twice",
                    entry.http_method, entry.path
                )));
            }
            routes.push(entry);
        }
        Ok(routes)
    }

    fn method_router<S: RowStore + 'static>(method: CrudMethod) -> MethodRouter<AppState<S>> {
        match method {
            CrudMethod::Create => post(handlers::create_item::<S>),
            CrudMethod::Read => get(handlers::read_item::<S>),
            CrudMethod::ReadMulti => get(handlers::read_items::<S>),
            CrudMethod::ReadPaginated => get(handlers::read_paginated::<S>),
            CrudMethod::Update => patch(handlers::update_item::<S>),
            CrudMethod::Delete => delete(handlers::delete_item::<S>),
            CrudMethod::DbDelete => delete(handlers::db_delete_item::<S>),
        }
    }

    pub fn into_router<S: RowStore + 'static>(self, store: Arc<S>) -> Result<Router> {
        let routes = self.routes()?;
        self.filter_config.check(self.crud.entity())?;

        if let Some(joins) = &self.joins {
            let mut request = QueryRequest::new().joins(joins.clone());
            if let Some(schema) = &self.read_schema {
                request = request.schema(Arc::clone(schema));
            }
            if self.nest_joins {
                request = request.nest();
            }
            QueryAssembler::new(self.crud.entity(), store.dialect())
                .require_join(true)
                .assemble(&request)?;
        }

        let mut router: Router<AppState<S>> = Router::new();
        for route in &routes {
            log::info!("Registering {} {}", route.http_method, route.path);
            router = router.route(&route.path, Self::method_router::<S>(route.method));
        }

        let state = Arc::new(ResourceState {
            store,
            crud: self.crud,
            create_schema: self.create_schema,
            update_schema: self.update_schema,
            read_schema: self.read_schema,
            joins: self.joins,
            nest_joins: self.nest_joins,
            filter_config: self.filter_config,
        });
        Ok(router.with_state(state))
    }
}
