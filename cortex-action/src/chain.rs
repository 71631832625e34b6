//! Chain execution: ordered steps, shared local memory, templates.

use crate::dispatch::Dispatcher;
use cortex_core::{Directive, SkillRegistry};
use cortex_kernel::Blackboard;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// What a step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    /// Dispatch a primitive action.
    Primitive,
    /// Call a registered skill.
    Tool,
    /// Read or write the blackboard.
    BlackboardOp,
    /// Sleep for `options.ms` (default 1000).
    Wait,
}

/// Blackboard operation selector for `blackboard-op` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BbOp {
    /// Read `name` into the step's data.
    Read,
    /// Write `params.value` at `name`.
    Write,
}

/// Comparison operator for step conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CondOp {
    /// Equal.
    #[serde(rename = "==")]
    Eq,
    /// Not equal.
    #[serde(rename = "!=")]
    Ne,
    /// Numerically less.
    #[serde(rename = "<")]
    Lt,
    /// Numerically less or equal.
    #[serde(rename = "<=")]
    Le,
    /// Numerically greater.
    #[serde(rename = ">")]
    Gt,
    /// Numerically greater or equal.
    #[serde(rename = ">=")]
    Ge,
    /// String or array containment.
    #[serde(rename = "contains")]
    Contains,
}

/// A step guard. The left side is template-resolved before comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Left operand, usually a `${...}` template.
    pub left: Value,
    /// Operator.
    pub op: CondOp,
    /// Right operand, taken literally.
    pub right: Value,
}

/// One chain step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChainStep {
    /// Step id, reported as the failing stage.
    pub id: String,
    /// What the step does.
    pub kind: StepKind,
    /// Primitive/skill name, or blackboard path.
    #[serde(default)]
    pub name: String,
    /// Blackboard operation (for `blackboard-op` steps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<BbOp>,
    /// Step params; templates are resolved before execution.
    #[serde(default)]
    pub params: Value,
    /// Optional guard; a false guard skips the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Capture the step's data into local memory under this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_as: Option<String>,
    /// Keep going when this step fails.
    #[serde(default)]
    pub ignore_failure: bool,
}

/// What one step did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// The step id.
    pub id: String,
    /// Whether it succeeded (skipped steps count as successes).
    pub success: bool,
    /// Whether the guard skipped it.
    pub skipped: bool,
    /// Step data.
    pub data: Value,
    /// Error when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a chain run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResult {
    /// Whether the chain ran to completion.
    pub success: bool,
    /// The failing step's id, when halted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// The halting error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Ordered records of every executed step.
    pub history: Vec<StepRecord>,
}

/// Executes chains against the dispatcher, skill registry, and
/// blackboard. Each run owns a private local memory cloned from the
/// caller's context; sibling chains never see it.
pub struct ChainExecutor {
    dispatcher: Arc<Dispatcher>,
    skills: Arc<dyn SkillRegistry>,
    blackboard: Arc<Blackboard>,
}

impl ChainExecutor {
    /// Assemble an executor.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        skills: Arc<dyn SkillRegistry>,
        blackboard: Arc<Blackboard>,
    ) -> Self {
        Self {
            dispatcher,
            skills,
            blackboard,
        }
    }

    /// Run a chain. `context` seeds local memory (non-objects seed an
    /// empty memory).
    pub async fn execute_chain(&self, chain: &[ChainStep], context: &Value) -> ChainResult {
        let mut local = context
            .as_object()
            .cloned()
            .unwrap_or_default();
        let mut history = Vec::with_capacity(chain.len());

        for step in chain {
            let params = resolve_templates(&step.params, &local, &self.blackboard);

            if let Some(condition) = &step.condition
                && !eval_condition(condition, &local, &self.blackboard)
            {
                history.push(StepRecord {
                    id: step.id.clone(),
                    success: true,
                    skipped: true,
                    data: Value::Null,
                    error: None,
                });
                continue;
            }

            let (success, data, error) = self.run_step(step, params).await;
            let record = StepRecord {
                id: step.id.clone(),
                success,
                skipped: false,
                data: data.clone(),
                error: error.clone(),
            };
            history.push(record);

            if let Some(key) = &step.store_as {
                let stored = if data.is_null() {
                    json!({"success": success, "error": error})
                } else {
                    data
                };
                local.insert(key.clone(), stored);
            }

            if !success && !step.ignore_failure {
                return ChainResult {
                    success: false,
                    stage: Some(step.id.clone()),
                    error,
                    history,
                };
            }
        }

        ChainResult {
            success: true,
            stage: None,
            error: None,
            history,
        }
    }

    async fn run_step(&self, step: &ChainStep, params: Value) -> (bool, Value, Option<String>) {
        match step.kind {
            StepKind::Primitive => {
                let outcome = self
                    .dispatcher
                    .dispatch(&Directive {
                        action_type: step.name.clone(),
                        params,
                        action_id: Some(step.id.clone()),
                    })
                    .await;
                (outcome.success, outcome.data, outcome.error)
            }
            StepKind::Tool => match self.skills.find_skill(&step.name) {
                Some(skill) => match skill.call(params).await {
                    Ok(data) => (true, data, None),
                    Err(e) => (false, Value::Null, Some(e.to_string())),
                },
                None => (
                    false,
                    Value::Null,
                    Some(format!("skill not found: {}", step.name)),
                ),
            },
            StepKind::BlackboardOp => match step.op {
                Some(BbOp::Read) | None => {
                    let value = self.blackboard.get(&step.name).unwrap_or(Value::Null);
                    (true, value, None)
                }
                Some(BbOp::Write) => {
                    let value = params.get("value").cloned().unwrap_or(Value::Null);
                    self.blackboard.set(&step.name, value, "chain");
                    (true, Value::Null, None)
                }
            },
            StepKind::Wait => {
                let ms = params
                    .get("options")
                    .and_then(|o| o.get("ms"))
                    .or_else(|| params.get("ms"))
                    .and_then(Value::as_u64)
                    .unwrap_or(1000);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                (true, json!({ "waited_ms": ms }), None)
            }
        }
    }
}

// --- Template resolution ---

/// Resolve `${key}` / `${BB.path}` templates in a params value.
/// A string that is exactly one template takes the looked-up value
/// with its type preserved; embedded templates stringify. Unresolved
/// templates are left literal.
#[must_use]
pub fn resolve_templates(
    value: &Value,
    local: &serde_json::Map<String, Value>,
    blackboard: &Blackboard,
) -> Value {
    match value {
        Value::String(s) => resolve_string(s, local, blackboard),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_templates(v, local, blackboard))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_templates(v, local, blackboard)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn lookup(key: &str, local: &serde_json::Map<String, Value>, blackboard: &Blackboard) -> Option<Value> {
    if let Some(v) = local.get(key) {
        return Some(v.clone());
    }
    key.strip_prefix("BB.").and_then(|path| blackboard.get(path))
}

fn resolve_string(
    s: &str,
    local: &serde_json::Map<String, Value>,
    blackboard: &Blackboard,
) -> Value {
    // Whole-token template: preserve the looked-up value's type.
    if let Some(inner) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}'))
        && !inner.contains("${")
        && let Some(v) = lookup(inner, local, blackboard)
    {
        return v;
    }

    // Embedded templates: substitute stringified values.
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match lookup(key, local, blackboard) {
                    Some(Value::String(text)) => out.push_str(&text),
                    Some(v) => out.push_str(&v.to_string()),
                    None => {
                        // Unresolved: leave the template literal.
                        out.push_str(&rest[start..start + 2 + end + 1]);
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Value::String(out)
}

fn eval_condition(
    condition: &Condition,
    local: &serde_json::Map<String, Value>,
    blackboard: &Blackboard,
) -> bool {
    let left = resolve_templates(&condition.left, local, blackboard);
    let right = &condition.right;
    match condition.op {
        CondOp::Eq => &left == right,
        CondOp::Ne => &left != right,
        CondOp::Lt | CondOp::Le | CondOp::Gt | CondOp::Ge => {
            let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
                return false;
            };
            match condition.op {
                CondOp::Lt => l < r,
                CondOp::Le => l <= r,
                CondOp::Gt => l > r,
                CondOp::Ge => l >= r,
                _ => unreachable!(),
            }
        }
        CondOp::Contains => match (&left, right) {
            (Value::String(l), Value::String(r)) => l.contains(r.as_str()),
            (Value::Array(items), needle) => items.contains(needle),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bb() -> Blackboard {
        let bb = Blackboard::new();
        bb.set("pos.home", json!({"x": 10, "y": 64, "z": 10}), "test");
        bb.set("status.health", json!(14.5), "test");
        bb
    }

    #[test]
    fn whole_token_template_preserves_type() {
        let mut local = serde_json::Map::new();
        local.insert("h".into(), json!({"x": 1}));
        let resolved = resolve_templates(&json!({"position": "${h}"}), &local, &bb());
        assert_eq!(resolved, json!({"position": {"x": 1}}));
    }

    #[test]
    fn blackboard_template_resolves_with_prefix() {
        let local = serde_json::Map::new();
        let resolved = resolve_templates(&json!("${BB.pos.home}"), &local, &bb());
        assert_eq!(resolved, json!({"x": 10, "y": 64, "z": 10}));
    }

    #[test]
    fn local_shadows_blackboard() {
        let mut local = serde_json::Map::new();
        local.insert("BB.pos.home".into(), json!("mine"));
        let resolved = resolve_templates(&json!("${BB.pos.home}"), &local, &bb());
        assert_eq!(resolved, json!("mine"));
    }

    #[test]
    fn embedded_templates_stringify() {
        let mut local = serde_json::Map::new();
        local.insert("name".into(), json!("creeper"));
        let resolved = resolve_templates(&json!("saw a ${name} at ${BB.status.health}"), &local, &bb());
        assert_eq!(resolved, json!("saw a creeper at 14.5"));
    }

    #[test]
    fn unresolved_templates_stay_literal() {
        let local = serde_json::Map::new();
        let resolved = resolve_templates(&json!("${missing} and ${also.missing}"), &local, &bb());
        assert_eq!(resolved, json!("${missing} and ${also.missing}"));
    }

    #[test]
    fn conditions_compare_numerically() {
        let local = serde_json::Map::new();
        let cond = Condition {
            left: json!("${BB.status.health}"),
            op: CondOp::Lt,
            right: json!(15),
        };
        assert!(eval_condition(&cond, &local, &bb()));
        let cond = Condition {
            left: json!("${BB.status.health}"),
            op: CondOp::Ge,
            right: json!(15),
        };
        assert!(!eval_condition(&cond, &local, &bb()));
    }

    #[test]
    fn contains_works_for_strings_and_arrays() {
        let mut local = serde_json::Map::new();
        local.insert("items".into(), json!(["stick", "torch"]));
        local.insert("msg".into(), json!("low on torches"));
        let cond = Condition {
            left: json!("${items}"),
            op: CondOp::Contains,
            right: json!("torch"),
        };
        assert!(eval_condition(&cond, &local, &bb()));
        let cond = Condition {
            left: json!("${msg}"),
            op: CondOp::Contains,
            right: json!("torch"),
        };
        assert!(eval_condition(&cond, &local, &bb()));
    }

    #[test]
    fn step_serde_accepts_wire_shape() {
        let step: ChainStep = serde_json::from_value(json!({
            "id": "a",
            "kind": "blackboard-op",
            "op": "read",
            "name": "pos.home",
            "store_as": "h"
        }))
        .unwrap();
        assert_eq!(step.kind, StepKind::BlackboardOp);
        assert_eq!(step.op, Some(BbOp::Read));
        assert_eq!(step.store_as.as_deref(), Some("h"));
    }
}
