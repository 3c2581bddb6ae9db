//! Import mappers.
//!
//! A mapper turns a remote record into local field values. It is declared
//! once per model as a list of direct copies followed by computed rules:
//!
//! ```ignore
//! let mapper = ImportMapper::new("shopware.res.partner")
//!     .direct("email", "email")
//!     .direct_with("changed", "updated_at", convert::datetime)
//!     .rule("names", |_, record| Ok(join_names(record)))
//!     .rule_on_create("customer", |_, _| Ok(values::object(json!({"customer": true}))));
//! ```
//!
//! Rules run in declaration order and their outputs are merged, later keys
//! winning. Rules registered with `rule_on_create` only run when the record
//! is created, so updates never overwrite local decisions.

use crate::binder::Binder;
use crate::config::BackendConfig;
use crate::environment::Environment;
use crate::error::{SyncError, SyncResult};
use serde_json::Value;
use storelink_core::{values, ExternalId, RecordId, Session, Values};

/// Options passed to the rules of a mapping run.
pub type MapOptions = Values;

/// Read-only view available to mapping rules.
pub struct MapContext<'a> {
    /// Backend environment.
    pub env: &'a Environment,
    /// Session of the current job.
    pub session: &'a dyn Session,
    /// Options of this run.
    pub options: MapOptions,
}

impl<'a> MapContext<'a> {
    /// Creates a mapping context.
    pub fn new(env: &'a Environment, session: &'a dyn Session, options: MapOptions) -> Self {
        Self {
            env,
            session,
            options,
        }
    }

    /// Returns the backend configuration.
    pub fn backend(&self) -> &BackendConfig {
        self.env.backend()
    }

    /// Returns a binder for `model`.
    pub fn binder(&self, model: &str) -> SyncResult<Binder> {
        self.env.binder(model)
    }

    /// Returns an option value.
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Resolves a remote id held in `value` to the local record bound in
    /// `model`.
    ///
    /// Fails with a mapping error when the remote id is set but unbound.
    /// Returns `None` when `value` holds no id.
    pub fn require_record(&self, model: &str, value: Option<&Value>) -> SyncResult<Option<RecordId>> {
        let Some(external_id) = value.and_then(ExternalId::from_value) else {
            return Ok(None);
        };
        match self.binder(model)?.to_record(self.session, &external_id)? {
            Some(id) => Ok(Some(id)),
            None => Err(SyncError::mapping(format!(
                "{model} with id {external_id} is not imported"
            ))),
        }
    }
}

/// Signature of computed rules.
pub type RuleFn = dyn Fn(&MapContext<'_>, &Values) -> SyncResult<Values> + Send + Sync;

/// Signature of direct-copy converters.
pub type ConvertFn = fn(&Value) -> Value;

struct DirectCopy {
    source: String,
    target: String,
    convert: Option<ConvertFn>,
}

struct Rule {
    name: &'static str,
    on_create_only: bool,
    apply: Box<RuleFn>,
}

/// Declarative mapper from remote records to local values.
pub struct ImportMapper {
    model: String,
    direct: Vec<DirectCopy>,
    rules: Vec<Rule>,
}

impl ImportMapper {
    /// Creates an empty mapper for `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            direct: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Returns the model this mapper produces values for.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Copies `source` to `target` unchanged.
    pub fn direct(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.direct.push(DirectCopy {
            source: source.into(),
            target: target.into(),
            convert: None,
        });
        self
    }

    /// Copies `source` to `target` through a converter.
    pub fn direct_with(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        convert: ConvertFn,
    ) -> Self {
        self.direct.push(DirectCopy {
            source: source.into(),
            target: target.into(),
            convert: Some(convert),
        });
        self
    }

    /// Adds a computed rule.
    pub fn rule<F>(mut self, name: &'static str, apply: F) -> Self
    where
        F: Fn(&MapContext<'_>, &Values) -> SyncResult<Values> + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            name,
            on_create_only: false,
            apply: Box::new(apply),
        });
        self
    }

    /// Adds a computed rule applied only on creation.
    pub fn rule_on_create<F>(mut self, name: &'static str, apply: F) -> Self
    where
        F: Fn(&MapContext<'_>, &Values) -> SyncResult<Values> + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            name,
            on_create_only: true,
            apply: Box::new(apply),
        });
        self
    }

    /// Returns the names of the computed rules, in order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    /// Prepares the mapping of one remote record.
    pub fn map_record(&self, record: &Values) -> MapRecord<'_> {
        MapRecord {
            mapper: self,
            source: record.clone(),
        }
    }
}

impl std::fmt::Debug for ImportMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportMapper")
            .field("model", &self.model)
            .field("direct", &self.direct.len())
            .field("rules", &self.rule_names())
            .finish()
    }
}

/// A remote record bound to the mapper that will translate it.
pub struct MapRecord<'m> {
    mapper: &'m ImportMapper,
    source: Values,
}

impl MapRecord<'_> {
    /// Returns the remote record.
    pub fn source(&self) -> &Values {
        &self.source
    }

    /// Computes the local values.
    ///
    /// Direct copies whose source field is absent are skipped. Rules see the
    /// remote record, not the values produced so far.
    pub fn values(&self, ctx: &MapContext<'_>, for_create: bool) -> SyncResult<Values> {
        let mut out = Values::new();
        for copy in &self.mapper.direct {
            if let Some(value) = self.source.get(&copy.source) {
                let value = match copy.convert {
                    Some(convert) => convert(value),
                    None => value.clone(),
                };
                out.insert(copy.target.clone(), value);
            }
        }
        for rule in &self.mapper.rules {
            if rule.on_create_only && !for_create {
                continue;
            }
            values::merge(&mut out, (rule.apply)(ctx, &self.source)?);
        }
        Ok(out)
    }
}

/// Converters for direct copies.
pub mod convert {
    use serde_json::Value;
    use storelink_core::{timestamp, values};

    /// Normalizes a remote timestamp to the store format, `null` if
    /// unparseable.
    pub fn datetime(value: &Value) -> Value {
        timestamp::from_value(value)
            .map(|dt| timestamp::to_value(&dt))
            .unwrap_or(Value::Null)
    }

    /// Interprets `1`, `"1"`, `true` and other truthy values as `true`.
    pub fn boolean(value: &Value) -> Value {
        match value {
            Value::String(s) => Value::Bool(!s.is_empty() && s != "0" && s != "false"),
            other => Value::Bool(values::is_truthy(other)),
        }
    }

    /// Replaces `null` with an empty string.
    pub fn text(value: &Value) -> Value {
        match value {
            Value::Null => Value::String(String::new()),
            Value::String(_) => value.clone(),
            other => Value::String(other.to_string()),
        }
    }

    /// Parses numbers sent as strings.
    pub fn number(value: &Value) -> Value {
        match value {
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map_or(Value::Null, Value::Number),
            Value::Number(_) => value.clone(),
            _ => Value::Null,
        }
    }
}
