use super::Generator;
use crate::error::Result;

/// Returned verbatim when nothing relevant was retrieved, and demanded of the
/// model when the context lacks the answer.
pub const NOT_FOUND_ANSWER: &str =
    "I apologize, but the requested information is not available in the retrieved fragments of the book.";

/// Grounded-answer prompt for a single textbook.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    book_title: String,
}

impl PromptTemplate {
    pub fn new(book_title: impl Into<String>) -> Self {
        Self {
            book_title: book_title.into(),
        }
    }

    pub fn render(&self, context: &str, question: &str) -> String {
        let book_title = &self.book_title;
        format!(
            r#"<SYSTEM_ROLE>
You are a senior AI scientist and teaching expert for the textbook "{book_title}". Explain its concepts with technical precision and accessible clarity, keeping full academic rigor.
</SYSTEM_ROLE>

<CONTEXT_STREAMS>
{context}
</CONTEXT_STREAMS>

<THOUGHT_PROCESS>
Before writing the answer:
1. Identify the core concepts in the user question.
2. Look for those concepts in <CONTEXT_STREAMS> across chapters, subchapters and sections.
3. Check whether the information is present in the provided fragments.
4. Treat any fact that is not explicitly stated in the documents as not found and do not use it.
</THOUGHT_PROCESS>

<STRICT_CONSTRAINTS>
1. SOURCE ADHERENCE: Use ONLY information provided in <CONTEXT_STREAMS>.
2. NO OUTSIDE KNOWLEDGE: Do not rely on pre-trained knowledge. What is not in the documents does not exist for this answer.
3. UNCERTAINTY PROTOCOL: If the answer is not contained in the context, respond exactly: "{NOT_FOUND_ANSWER}"
4. CITATIONS: Cite the page number supporting each paragraph using the format [Page X] at the end of the paragraph.
5. MATHEMATICAL NOTATION: Write formulas and equations in LaTeX ($ for inline, $$ for blocks).
6. NO LATEX FOR TEXT: Do not use LaTeX commands such as \text{{}}, \tag{{}} or \mathrm{{}} for regular prose. Use standard Markdown for text formatting.
7. LANGUAGE: Respond in the same language as the user question.
</STRICT_CONSTRAINTS>

USER QUESTION: {question}

Technical Response:"#
        )
    }
}

/// Wraps a generator whose output must be a single parseable JSON object.
pub struct JsonOnlyGenerator<G> {
    inner: G,
}

impl<G: Generator> JsonOnlyGenerator<G> {
    pub fn new(mut inner: G) -> Self {
        inner.request_json_output();
        Self { inner }
    }
}

impl<G: Generator> Generator for JsonOnlyGenerator<G> {
    fn generate(&self, prompt: &str) -> Result<String> {
        let raw = self.inner.generate(prompt)?;
        Ok(sanitize_json_output(&raw))
    }
}

/// Keeps the outermost `{...}` span, flattens escaped line breaks and
/// replaces each run of non-ASCII characters with a single space.
pub fn sanitize_json_output(raw: &str) -> String {
    let trimmed = raw.trim();
    let span = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };

    let flattened = span.replace("\\n", " ").replace("\\r", " ");
    let mut cleaned = String::with_capacity(flattened.len());
    let mut in_non_ascii_run = false;
    for character in flattened.chars() {
        if character.is_ascii() {
            cleaned.push(character);
            in_non_ascii_run = false;
        } else if !in_non_ascii_run {
            cleaned.push(' ');
            in_non_ascii_run = true;
        }
    }
    cleaned
}
