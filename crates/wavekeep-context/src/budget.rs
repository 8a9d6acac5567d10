//! Token budget allocation for `FreshContextManager` (§4.6).
//!
//! The split between fixed slots and the dynamic pool mirrors the teacher's
//! layered-config philosophy: every number here is a `ContextConfig` default,
//! never a magic constant.

use wavekeep_core::config::ContextConfig;

/// A concrete allocation of `ContextConfig::max_tokens` across context slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBudget {
    pub total: u32,
    pub system_prompt: u32,
    pub repo_map: u32,
    pub codebase_docs: u32,
    pub task_spec: u32,
    pub reserved: u32,
    pub files: u32,
    pub code_results: u32,
    pub memories: u32,
}

impl TokenBudget {
    /// Tokens still available after the fixed slots, before the dynamic split.
    pub fn dynamic_pool(&self) -> u32 {
        self.files + self.code_results + self.memories
    }
}

/// Builds a [`TokenBudget`] from a [`ContextConfig`] and estimates/truncates
/// text against it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBudgeter;

impl TokenBudgeter {
    pub fn new() -> Self {
        Self
    }

    /// Allocates the fixed slots from `config`, then splits whatever remains
    /// of `config.max_tokens` as files=60%, code_results=25%, memories=15%.
    /// The remainder of integer division is folded into `memories` so the
    /// three dynamic slots always sum to exactly the dynamic pool.
    pub fn allocate(&self, config: &ContextConfig) -> TokenBudget {
        let fixed = config.system_prompt_tokens
            + config.repo_map_tokens
            + config.codebase_docs_tokens
            + config.task_spec_tokens
            + config.reserved_tokens;
        let dynamic = config.max_tokens.saturating_sub(fixed);

        let files = dynamic * 60 / 100;
        let code_results = dynamic * 25 / 100;
        let memories = dynamic - files - code_results;

        TokenBudget {
            total: config.max_tokens,
            system_prompt: config.system_prompt_tokens,
            repo_map: config.repo_map_tokens,
            codebase_docs: config.codebase_docs_tokens,
            task_spec: config.task_spec_tokens,
            reserved: config.reserved_tokens,
            files,
            code_results,
            memories,
        }
    }

    /// `ceil(len(text) / 4)` — the conservative character/token heuristic
    /// that is the contract for all budget math in this crate.
    pub fn estimate_tokens(&self, text: &str) -> u32 {
        ((text.len() as u64 + 3) / 4) as u32
    }

    /// Returns the longest prefix of `text` (on a char boundary) whose
    /// estimated token count is `<= budget`.
    pub fn truncate_to_fit<'a>(&self, text: &'a str, budget: u32) -> &'a str {
        let max_bytes = (budget as usize).saturating_mul(4);
        if text.len() <= max_bytes {
            return text;
        }
        let mut end = max_bytes;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_splits_as_specified() {
        let budget = TokenBudgeter::new().allocate(&ContextConfig::default());
        assert_eq!(budget.total, 150_000);
        assert_eq!(budget.system_prompt, 2_000);
        assert_eq!(budget.reserved, 16_000);

        let dynamic = budget.total
            - budget.system_prompt
            - budget.repo_map
            - budget.codebase_docs
            - budget.task_spec
            - budget.reserved;
        assert_eq!(budget.dynamic_pool(), dynamic);
        assert_eq!(budget.files, dynamic * 60 / 100);
        assert_eq!(budget.code_results, dynamic * 25 / 100);
    }

    #[test]
    fn estimate_tokens_rounds_up() {
        let budgeter = TokenBudgeter::new();
        assert_eq!(budgeter.estimate_tokens(""), 0);
        assert_eq!(budgeter.estimate_tokens("ab"), 1);
        assert_eq!(budgeter.estimate_tokens("abcd"), 1);
        assert_eq!(budgeter.estimate_tokens("abcde"), 2);
    }

    #[test]
    fn truncate_to_fit_respects_char_boundaries() {
        let budgeter = TokenBudgeter::new();
        let text = "héllo wörld"; // contains multi-byte chars
        let truncated = budgeter.truncate_to_fit(text, 2);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn truncate_to_fit_returns_whole_text_when_under_budget() {
        let budgeter = TokenBudgeter::new();
        assert_eq!(budgeter.truncate_to_fit("short", 1000), "short");
    }
}
