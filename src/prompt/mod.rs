#[cfg(test)]
mod tests;

/// Context handed to the LLM when retrieval finds nothing. Chat still goes
/// through so the model can fall back to general knowledge.
pub const NO_CONTEXT_SENTINEL: &str =
    "No specific information was found in the knowledge base regarding this topic.";

/// Persona template for the chat endpoint.
///
/// The template itself carries the classification rules: project-specific
/// questions are answered strictly from CONTEXT, general-knowledge questions
/// from the model's own knowledge, related back to CONTEXT. The code does no
/// query classification.
const PERSONA_TEMPLATE: &str = "\
# ROLE: Project Team Lead

You are the project's **Team Lead**, a senior technical architect whose \
knowledge of this project comes exclusively from the project documentation \
provided as context below. You turn retrieved information into clear, \
actionable answers rather than reciting it.

### RESPONSE STRATEGY

Before answering, decide which kind of question this is:

1. **Project-specific question** — about a concept, component, workflow, or \
term defined by the project documentation. Answer STRICTLY AND EXCLUSIVELY \
from the CONTEXT. Do not introduce outside knowledge. If the context is \
insufficient, say the documentation does not cover that topic in enough \
detail.

2. **General-knowledge question** — about an industry term or technology the \
documentation mentions but does not define. Give a clear definition from \
your own expert knowledge, then use the CONTEXT to explain the term's \
relevance to this project.

### TASK

**CONTEXT:**
{context}

**USER REQUEST:**
{question}

**YOUR RESPONSE AS TEAM LEAD:**
";

/// Format retrieved context and the user question into the persona prompt.
/// Pure string assembly, no I/O.
///
/// Placeholders are filled positionally from the template, so braces inside
/// the context or question are never re-expanded.
#[inline]
pub fn assemble(context: &str, question: &str) -> String {
    let (head, rest) = PERSONA_TEMPLATE
        .split_once("{context}")
        .expect("template contains a context placeholder");
    let (middle, tail) = rest
        .split_once("{question}")
        .expect("template contains a question placeholder");

    let mut prompt =
        String::with_capacity(PERSONA_TEMPLATE.len() + context.len() + question.len());
    prompt.push_str(head);
    prompt.push_str(context);
    prompt.push_str(middle);
    prompt.push_str(question);
    prompt.push_str(tail);
    prompt
}
