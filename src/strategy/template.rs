//! Jinja templating for the raw strategy.
//!
//! Templates are rendered with `minijinja` against a JSON context, so
//! filters (`{{ name|upper }}`), conditionals and loops are available.
//! Auto-escaping is off. Undefined values and lookups through them render
//! as nothing, and so does `null`. Objects and arrays render as compact JSON.
//!
//! Syntax errors are configuration errors; any other render failure is an
//! invalid payload.

use std::fmt::Write;
use std::sync::OnceLock;

use minijinja::value::ValueKind;
use minijinja::{AutoEscape, Environment, Error, ErrorKind, Output, State, UndefinedBehavior};
use serde_json::Value;

use crate::dispatch::error::{DispatchError, DispatchResult};

/// Renders configuration templates against a call context.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &Value) -> DispatchResult<String>;
}

/// Default renderer backed by a shared `minijinja` environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct JinjaTemplate;

impl TemplateRenderer for JinjaTemplate {
    fn render(&self, template: &str, context: &Value) -> DispatchResult<String> {
        if !template.contains("{{") && !template.contains("{%") && !template.contains("{#") {
            return Ok(template.to_string());
        }

        template_env().render_str(template, context).map_err(|e| match e.kind() {
            ErrorKind::SyntaxError => DispatchError::configuration(format!("Invalid template: {}", e)),
            _ => DispatchError::invalid_payload(format!("Template rendering failed: {}", e)),
        })
    }
}

fn template_env() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_formatter(format_value);
        env
    })
}

fn format_value(out: &mut Output<'_>, state: &State<'_, '_>, value: &minijinja::Value) -> Result<(), Error> {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Ok(()),
        ValueKind::Seq | ValueKind::Map => {
            let json = serde_json::to_string(value)
                .map_err(|e| Error::new(ErrorKind::BadSerialization, e.to_string()))?;
            out.write_str(&json).map_err(|_| Error::from(ErrorKind::WriteFailure))
        }
        _ => minijinja::escape_formatter(out, state, value),
    }
}
