//! Dependency closure over a prompt's input links
//!
//! Given a full prompt and one or more sender nodes, keeps exactly the nodes
//! needed to compute the senders' outputs: every node reachable by following
//! input links, and nothing else.

use std::collections::HashSet;

use tracing::debug;

use crate::graph::NodeId;
use crate::prompt::{Prompt, PromptSubmission};

/// Ids reachable from `senders` through input links (senders included)
///
/// Ids absent from the prompt end their branch. The visited set makes the
/// walk safe on cyclic input.
pub fn collect_dependencies<S: AsRef<str>>(prompt: &Prompt, senders: &[S]) -> HashSet<NodeId> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<NodeId> = senders.iter().map(|s| s.as_ref().to_string()).collect();

    while let Some(id) = stack.pop() {
        if !prompt.contains(&id) || visited.contains(&id) {
            continue;
        }
        for source in prompt.input_sources(&id) {
            if !visited.contains(&source) {
                stack.push(source);
            }
        }
        visited.insert(id);
    }

    visited
}

/// Reduce `prompt` to the dependency closure of `senders`, order preserved
pub fn filter_prompt<S: AsRef<str>>(prompt: &Prompt, senders: &[S]) -> Prompt {
    let keep = collect_dependencies(prompt, senders);
    let filtered = prompt.retain_ids(|id| keep.contains(id));
    debug!(
        senders = senders.len(),
        kept = filtered.len(),
        total = prompt.len(),
        "Filtered prompt to dependency closure"
    );
    filtered
}

/// Intercept a submission headed for `/prompt`
///
/// A user-originated submission containing `sender_class` nodes is reduced
/// to their closure and tagged. Tagged submissions and submissions without
/// senders pass through untouched.
pub fn intercept(mut submission: PromptSubmission, sender_class: &str) -> PromptSubmission {
    if submission.is_tagged() {
        return submission;
    }

    let senders = submission.prompt.ids_of_class(sender_class);
    if senders.is_empty() {
        return submission;
    }

    debug!(sender_class, senders = ?senders, "Intercepting submission with sender nodes");
    submission.prompt = filter_prompt(&submission.prompt, &senders);
    submission.extra_data.is_group_executor_request = true;
    submission
}
