//! Built-in prompt templates.

/// System prompt for analyzing a single file.
pub const SINGLE_FILE_PROMPT: &str = "\
You are a professional code analysis assistant. Analyze the code file below and cover:

1. The main purpose and functionality of the code
2. Its architecture and the design patterns it uses
3. Potential bugs, security issues or performance bottlenecks
4. An assessment of code quality with concrete improvement suggestions

Answer in Markdown, using headings and paragraphs so the result is easy to read.
";

/// System prompt for the project-level summary.
pub const SUMMARY_PROMPT: &str = "\
You are a professional code analyst. Using the per-file analysis results provided, \
write a summary report for the whole project. The report should contain:

1. Project overview: overall structure, main features and technology stack
2. Core components: identify the core components and how they interact
3. Code quality: an overall assessment based on the per-file analyses
4. Architecture review: strengths and weaknesses of the design
5. Recommendations: concrete improvements to code and architecture

Answer in Markdown with a clear heading hierarchy; describe diagrams in prose where useful.
";

/// Lead-in for the user message of a summary request.
pub const SUMMARY_REQUEST_INTRO: &str = "Below are the analysis results for each file in the project. \
Produce a project-level summary report from them:";

/// Build the user message for a single-file analysis.
pub fn file_request(path: &str, content: &str) -> String {
    format!("File: {path}\n\nCode:\n{content}")
}

/// Build the user message for a summary request.
pub fn summary_request(document: &str) -> String {
    format!("{SUMMARY_REQUEST_INTRO}\n\n{document}")
}

/// Format one file's analysis as a section of the summary document.
pub fn summary_section(path: &str, analysis: &str) -> String {
    format!("## File: {path}\n\n{analysis}\n\n")
}
