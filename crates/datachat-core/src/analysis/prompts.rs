//! Prompt templates for uploaded files and CSV questions.

pub const DATA_ANALYST_ROLE: &str = "You are an expert data analyst and visualization specialist. \
Answer questions about data precisely, and when a chart helps, write and run Python code \
(pandas, matplotlib, seaborn) to produce it.";

pub const DATA_ANALYSIS_INSTRUCTIONS: &str = "When answering:\n\
1. Base every number on the data provided above; do not invent values.\n\
2. If the question asks for a chart, write Python code that builds the DataFrame from the data and renders the plot.\n\
3. Label axes and give every chart a title.\n\
4. Summarize the key finding in one or two sentences after any code or chart.\n\
5. If the data cannot answer the question, say so and explain what is missing.";

/// Wraps a question about an attached image or document.
pub fn file_upload_prompt(question: &str) -> String {
    format!(
        "{DATA_ANALYST_ROLE}\n\n\
         The user has attached a file. Examine it carefully and answer their question.\n\n\
         User's question: {question}"
    )
}

/// Prepends the dataset context from
/// [`CsvDataset::generate_context`](super::csv::CsvDataset::generate_context).
pub fn csv_prompt(context: &str, question: &str) -> String {
    format!("{context}\n{DATA_ANALYSIS_INSTRUCTIONS}\n\nUser's question: {question}")
}
