//! Prompt templates for the retriever, ranker, and planner roles.
//!
//! Domain logic for rendering role prompts. Provider-agnostic: every template
//! renders to a (system, user) pair the backend turns into chat messages.

use crate::gateway::ChatRequest;
use crate::topsis::Weights;

/// Rendered prompt ready for a backend call.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub role_slug: &'static str,
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn to_request(&self) -> ChatRequest {
        ChatRequest::new(&self.system, &self.user)
    }
}

/// A role template with placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

// =============================================================================
// Retriever
// =============================================================================

pub const RETRIEVER_PROMPT: PromptTemplate = PromptTemplate {
    slug: "retriever_v1",
    system: "You are a retrieval agent that selects relevant APIs from a JSON catalog \
             based on the user goal. Return strict JSON as instructed by the prompt; \
             never invent services.",
    user: r#"User goal:
{user_goal}

Catalog batch (JSON array of services):
{batch_json}

Select the services from this batch that are relevant to the goal. Use only
api_id values that appear in the batch above. For each kept service give a
one-sentence reason.

Return only JSON:
{"keep": [{"api_id": "...", "reason": "..."}]}"#,
};

/// Render the per-batch retrieval prompt.
pub fn render_retriever(goal: &str, batch_json: &str) -> PromptInstance {
    PromptInstance {
        role_slug: RETRIEVER_PROMPT.slug,
        system: RETRIEVER_PROMPT.system.to_string(),
        user: RETRIEVER_PROMPT
            .user
            .replace("{user_goal}", goal)
            .replace("{batch_json}", batch_json),
    }
}

// =============================================================================
// Ranker
// =============================================================================

pub const RANKER_PROMPT: PromptTemplate = PromptTemplate {
    slug: "ranker_topsis_v1",
    system: "You are a QoS evaluator. Apply TOPSIS to rt_ms (cost), tp_rps (benefit), \
             and availability (benefit). Follow the prompt strictly and return valid JSON.",
    user: r#"Apply TOPSIS to the QoS table below with weights (rt_ms, tp_rps, availability) = {weights}.

Procedure:
1. Treat null (or -1) as unknown; exclude unknown values from normalization and distances.
2. Vector-normalize each criterion by the Euclidean norm of its present values.
3. Multiply by the weights. rt_ms is a cost criterion (lower is better); tp_rps and
   availability are benefit criteria (higher is better).
4. Compute each row's Euclidean distance to the ideal-best (D_plus) and ideal-worst
   (D_minus) over the criteria it has values for.
5. C = D_minus / (D_plus + D_minus); use 0.0 when both distances are zero.
6. Sort descending by C.

Table:
{qos_table}

Return only JSON:
{"ranked": [{"api_id": "...", "C": 0.0, "D_plus": 0.0, "D_minus": 0.0}]}"#,
};

/// Render the TOPSIS ranking prompt over a serialized QoS table.
pub fn render_ranker(qos_table_json: &str, weights: Weights) -> PromptInstance {
    let weights_str = format!("({}, {}, {})", weights.rt, weights.tp, weights.av);
    PromptInstance {
        role_slug: RANKER_PROMPT.slug,
        system: RANKER_PROMPT.system.to_string(),
        user: RANKER_PROMPT
            .user
            .replace("{weights}", &weights_str)
            .replace("{qos_table}", qos_table_json),
    }
}

// =============================================================================
// Planner
// =============================================================================

pub const PLANNER_PROMPT: PromptTemplate = PromptTemplate {
    slug: "planner_v1",
    system: "You are an orchestration planner that composes a logical API workflow \
             using only the ranked APIs. Follow the prompt strictly and return valid JSON.",
    user: r#"User goal:
{user_goal}

Ranked candidate APIs (best first, C is the TOPSIS closeness):
{ranked_compact}

Compose a workflow that satisfies the goal using only the api_id values listed
above. Order the steps logically and say what each step contributes.

Return only a JSON object, for example:
{"workflow": [{"step": 1, "api_id": "...", "action": "..."}], "notes": "..."}"#,
};

/// Render the planning prompt from the goal and a compact ranked list.
pub fn render_planner(goal: &str, ranked_compact_json: &str) -> PromptInstance {
    PromptInstance {
        role_slug: PLANNER_PROMPT.slug,
        system: PLANNER_PROMPT.system.to_string(),
        user: PLANNER_PROMPT
            .user
            .replace("{user_goal}", goal)
            .replace("{ranked_compact}", ranked_compact_json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriever_render_interpolates() {
        let p = render_retriever("5 day forecast", r#"[{"api_id": "w1"}]"#);
        assert!(p.system.contains("retrieval agent"));
        assert!(p.user.contains("5 day forecast"));
        assert!(p.user.contains(r#"[{"api_id": "w1"}]"#));
        assert!(!p.user.contains("{user_goal}"));
        assert!(!p.user.contains("{batch_json}"));
    }

    #[test]
    fn ranker_render_includes_weights_and_table() {
        let p = render_ranker(r#"[{"api_id": "a"}]"#, Weights::default());
        assert!(p.user.contains("(0.5, 0.3, 0.2)"));
        assert!(p.user.contains(r#"[{"api_id": "a"}]"#));
    }

    #[test]
    fn planner_render_interpolates() {
        let p = render_planner("goal", r#"[{"api_id": "a", "C": 0.9}]"#);
        assert!(p.user.contains("goal"));
        assert!(p.user.contains(r#""C": 0.9"#));
    }

    #[test]
    fn to_request_forces_json_at_zero_temperature() {
        let req = render_retriever("g", "[]").to_request();
        assert!(req.force_json);
        assert_eq!(req.temperature, 0.0);
    }
}
