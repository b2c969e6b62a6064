//! Deliberation prompt construction.
//!
//! Peer answers are identified by position, not by model, so no member
//! can weight a peer's answer by its provider's reputation.

/// Prompt for one member in a deliberation round.
///
/// `peers` holds the previous-round contents of every other member, in
/// round order.
#[must_use]
pub fn deliberation_prompt(query: &str, own_previous: &str, peers: &[&str]) -> String {
    let mut prompt = String::with_capacity(
        query.len() + own_previous.len() + peers.iter().map(|p| p.len() + 32).sum::<usize>() + 512,
    );

    prompt.push_str("The council was asked:\n\n");
    prompt.push_str(query);
    prompt.push_str("\n\nYour previous answer:\n\n");
    prompt.push_str(own_previous);
    prompt.push_str("\n\nAnswers from the other council members:\n");
    for (position, peer) in peers.iter().enumerate() {
        prompt.push_str(&format!("\n--- Response {} ---\n{peer}\n", position + 1));
    }
    prompt.push_str(
        "\nReview the other responses against your own. Critique them, \
         agree where they are right, and produce your refined answer. \
         Reply with the refined answer only.",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_query_own_answer_and_peers() {
        let prompt = deliberation_prompt("capital of France?", "Paris", &["Lyon", "Paris, clearly"]);

        assert!(prompt.contains("capital of France?"));
        assert!(prompt.contains("Your previous answer:\n\nParis"));
        assert!(prompt.contains("--- Response 1 ---\nLyon"));
        assert!(prompt.contains("--- Response 2 ---\nParis, clearly"));
    }

    #[test]
    fn prompt_has_no_member_identifiers() {
        let prompt = deliberation_prompt("q", "a", &["b"]);
        assert!(!prompt.contains("member"));
    }
}
