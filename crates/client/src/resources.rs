//! Static resource mapping table.
//!
//! Maps a resource name to its operations: HTTP method, path template, and
//! query parameter list. The table replaces runtime class generation from a
//! discovery document with plain data; extending the API surface means
//! adding table entries, not generating code.
//!
//! Path templates use `{param}` placeholders filled from caller-supplied
//! values; a missing required placeholder value is an error.

use serde_json::Value;

use restcache_core::{Error, Operation};

use crate::endpoint::{ApiRequest, Conditions, Method};

/// One operation on a resource: how to turn it into an HTTP request.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub method: Method,
    /// Path template with `{param}` placeholders, relative to the base URL.
    pub path: String,
    /// Recognized query parameters. Only values the caller actually
    /// supplies are sent.
    pub params: Vec<String>,
}

/// A named REST resource and its operation table.
///
/// The resource name doubles as the local store collection name. Resources
/// are inline-keyed by default (the primary key lives in the body, as with
/// GData-style feeds); `external_key()` opts out.
#[derive(Debug, Clone)]
pub struct Resource {
    name: String,
    key_param: String,
    inline_key: bool,
    operations: Vec<(Operation, OperationSpec)>,
}

impl Resource {
    pub fn new(name: impl Into<String>, key_param: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_param: key_param.into(),
            inline_key: true,
            operations: Vec::new(),
        }
    }

    /// Mark this resource as externally keyed: cache writes use the
    /// caller-supplied key instead of deriving one from the body.
    pub fn external_key(mut self) -> Self {
        self.inline_key = false;
        self
    }

    /// Register an operation in the table.
    pub fn operation(mut self, op: Operation, method: Method, path: &str, params: &[&str]) -> Self {
        self.operations.push((
            op,
            OperationSpec {
                method,
                path: path.to_string(),
                params: params.iter().map(|p| p.to_string()).collect(),
            },
        ));
        self
    }

    /// Resource name; also the local store collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the path parameter that carries the record key.
    pub fn key_param(&self) -> &str {
        &self.key_param
    }

    pub fn inline_key(&self) -> bool {
        self.inline_key
    }

    /// Look up the spec for an operation.
    ///
    /// An operation absent from the table is unsupported for this resource.
    pub fn spec(&self, op: Operation) -> Result<&OperationSpec, Error> {
        self.operations
            .iter()
            .find(|(o, _)| *o == op)
            .map(|(_, spec)| spec)
            .ok_or_else(|| Error::Unsupported(format!("{op} on {}", self.name)))
    }

    /// Build the request for an operation: the single generic dispatch
    /// point consuming the table.
    ///
    /// `values` supplies both path placeholders and query parameters by
    /// name. Query parameters the caller doesn't supply are omitted.
    pub fn request(
        &self,
        op: Operation,
        values: &[(&str, &str)],
        conditions: Conditions,
        body: Option<Value>,
    ) -> Result<ApiRequest, Error> {
        let spec = self.spec(op)?;
        let path = self.fill_path(&spec.path, values)?;

        let params = spec
            .params
            .iter()
            .filter_map(|name| {
                values
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| (name.clone(), v.to_string()))
            })
            .collect();

        Ok(ApiRequest { method: spec.method, path, params, conditions, body })
    }

    fn fill_path(&self, template: &str, values: &[(&str, &str)]) -> Result<String, Error> {
        let mut path = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}') else {
                return Err(Error::Missing {
                    resource: self.name.clone(),
                    what: format!("closing brace in path template {template}"),
                });
            };
            path.push_str(&rest[..open]);
            let param = &rest[open + 1..open + close];
            let value = values
                .iter()
                .find(|(k, _)| *k == param)
                .map(|(_, v)| *v)
                .ok_or_else(|| Error::Missing {
                    resource: self.name.clone(),
                    what: format!("parameter {param}"),
                })?;
            path.push_str(value);
            rest = &rest[open + close + 1..];
        }
        path.push_str(rest);

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_resource() -> Resource {
        Resource::new("feed", "feed")
            .operation(Operation::Read, Method::Get, "lists/{feed}", &["fields"])
            .operation(Operation::Update, Method::Put, "lists/{feed}", &[])
            .operation(Operation::Create, Method::Post, "lists", &[])
            .operation(Operation::Delete, Method::Delete, "lists/{feed}", &[])
    }

    #[test]
    fn test_path_templating() {
        let resource = feed_resource();
        let req = resource
            .request(Operation::Read, &[("feed", "abc")], Conditions::none(), None)
            .unwrap();
        assert_eq!(req.path, "lists/abc");
        assert_eq!(req.method, Method::Get);
    }

    #[test]
    fn test_missing_path_parameter() {
        let resource = feed_resource();
        let err = resource
            .request(Operation::Read, &[], Conditions::none(), None)
            .unwrap_err();
        assert!(matches!(err, Error::Missing { resource, what } if resource == "feed" && what.contains("feed")));
    }

    #[test]
    fn test_query_params_only_when_supplied() {
        let resource = feed_resource();

        let req = resource
            .request(
                Operation::Read,
                &[("feed", "abc"), ("fields", "title")],
                Conditions::none(),
                None,
            )
            .unwrap();
        assert_eq!(req.params, vec![("fields".to_string(), "title".to_string())]);

        let req = resource
            .request(Operation::Read, &[("feed", "abc")], Conditions::none(), None)
            .unwrap();
        assert!(req.params.is_empty());
    }

    #[test]
    fn test_unlisted_values_not_sent_as_query() {
        let resource = feed_resource();
        let req = resource
            .request(
                Operation::Read,
                &[("feed", "abc"), ("bogus", "x")],
                Conditions::none(),
                None,
            )
            .unwrap();
        assert!(req.params.is_empty());
    }

    #[test]
    fn test_unsupported_operation_for_resource() {
        let resource = Resource::new("feed", "feed").operation(Operation::Read, Method::Get, "lists/{feed}", &[]);
        let err = resource.spec(Operation::Delete).unwrap_err();
        assert!(matches!(err, Error::Unsupported(msg) if msg.contains("delete") && msg.contains("feed")));
    }

    #[test]
    fn test_multi_parameter_template() {
        let resource = Resource::new("entry", "entry").operation(
            Operation::Read,
            Method::Get,
            "lists/{feed}/entries/{entry}",
            &[],
        );
        let req = resource
            .request(
                Operation::Read,
                &[("feed", "f1"), ("entry", "e2")],
                Conditions::none(),
                None,
            )
            .unwrap();
        assert_eq!(req.path, "lists/f1/entries/e2");
    }

    #[test]
    fn test_inline_key_default() {
        assert!(feed_resource().inline_key());
        assert!(!Resource::new("x", "x").external_key().inline_key());
    }
}
