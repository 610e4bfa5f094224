use super::*;

#[test]
fn embeds_context_and_question() {
    let prompt = assemble("chunk one\n\nchunk two", "What is the deploy workflow?");

    assert!(prompt.contains("chunk one\n\nchunk two"));
    assert!(prompt.contains("What is the deploy workflow?"));
    // Context must appear before the question, matching the template order.
    let context_pos = prompt.find("chunk one").expect("context present");
    let question_pos = prompt.find("What is the").expect("question present");
    assert!(context_pos < question_pos);
}

#[test]
fn placeholders_are_fully_replaced() {
    let prompt = assemble("ctx", "q");
    assert!(!prompt.contains("{context}"));
    assert!(!prompt.contains("{question}"));
}

#[test]
fn braces_in_user_input_are_preserved_literally() {
    let prompt = assemble("code: fn main() {}", "what does {question} mean?");
    assert!(prompt.contains("fn main() {}"));
    // The user's literal "{question}" must not be expanded again.
    assert!(prompt.contains("what does {question} mean?"));
}

#[test]
fn sentinel_context_flows_through() {
    let prompt = assemble(NO_CONTEXT_SENTINEL, "anything");
    assert!(prompt.contains(NO_CONTEXT_SENTINEL));
}
