//! Default prompt rendering: `{{variable}}` and `{{context.variable}}`
//! substitution over a flat JSON object (spec §3 `PromptDescriptor`).

use serde_json::Value;

use crate::error::{CoreError, FieldError, Result};

/// Render `template` by substituting `{{name}}` with `variables.name` and
/// `{{context.name}}` with `context.name`. Missing bindings are reported as
/// a single [`CoreError::InvalidInput`] naming every unresolved site, not
/// just the first (spec §4.3: validation errors should be exhaustive).
pub fn render_default(template: &str, variables: &Value, context: Option<&Value>) -> Result<String> {
    let mut output = String::with_capacity(template.len());
    let mut missing = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            // Unterminated marker: treat the rest of the template as literal.
            output.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let key = after_open[..end].trim();
        match resolve(key, variables, context) {
            Some(value) => output.push_str(&value),
            None => missing.push(FieldError {
                field: key.to_string(),
                message: "no binding found for template placeholder".to_string(),
            }),
        }
        rest = &after_open[end + 2..];
    }
    output.push_str(rest);

    if missing.is_empty() {
        Ok(output)
    } else {
        Err(CoreError::InvalidInput(missing))
    }
}

fn resolve(key: &str, variables: &Value, context: Option<&Value>) -> Option<String> {
    let value = if let Some(rest) = key.strip_prefix("context.") {
        context.and_then(|ctx| ctx.get(rest))
    } else {
        variables.get(key)
    }?;
    Some(value_to_string(value))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_plain_variables() {
        let vars = json!({ "name": "Ada", "count": 3 });
        let rendered = render_default("hello {{name}}, you have {{count}} items", &vars, None).unwrap();
        assert_eq!(rendered, "hello Ada, you have 3 items");
    }

    #[test]
    fn substitutes_context_variables() {
        let vars = json!({});
        let ctx = json!({ "user_id": "u-1" });
        let rendered = render_default("user={{context.user_id}}", &vars, Some(&ctx)).unwrap();
        assert_eq!(rendered, "user=u-1");
    }

    #[test]
    fn reports_every_missing_binding() {
        let vars = json!({});
        let err = render_default("{{a}} and {{b}}", &vars, None).unwrap_err();
        match err {
            CoreError::InvalidInput(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].field, "a");
                assert_eq!(fields[1].field, "b");
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_marker_is_kept_literal() {
        let vars = json!({});
        let rendered = render_default("broken {{oops", &vars, None).unwrap();
        assert_eq!(rendered, "broken {{oops");
    }
}
