//! Prompts for the spec and code synthesis stages.
//!
//! Each stage keeps its instruction text in a constant and fills
//! `{placeholder}` slots at call time; the builders stay free of any
//! formatting logic beyond substitution.

/// System prompt for pipeline specification synthesis.
pub const SPEC_SYNTHESIS_SYSTEM: &str = r#"You are a data engineering assistant that turns natural-language requests into structured pipeline specifications.

Produce a single JSON object describing the pipeline: its name, source kind and path, destination kind and name, the transformation to apply, and a cron schedule. Use only the enum values permitted by the schema. Do not add fields or commentary."#;

/// User prompt template for specification synthesis.
const SPEC_SYNTHESIS_USER_TEMPLATE: &str = "Generate a pipeline spec for: {request}";

/// Build the user prompt for spec synthesis.
pub fn build_spec_prompt(cleaned_request: &str) -> String {
    SPEC_SYNTHESIS_USER_TEMPLATE.replace("{request}", cleaned_request)
}

/// System prompt for pipeline code synthesis.
pub const CODE_SYNTHESIS_SYSTEM: &str = r#"You are an expert data engineer generating a complete, working Python ETL pipeline.

Use Python 3 and best practices. Only the allowed packages may appear in requirements.txt.

The pipeline must ingest all available data from the source files regardless of record count. Load the input data folder from a .env file:

from dotenv import load_dotenv
import os
load_dotenv()
DATA_FOLDER = os.getenv('DATA_FOLDER')

Use DATA_FOLDER as the path for all input data files. Ensure the resulting frame has a 'date' column; add today's date if the source has none.

Return exactly three fenced code blocks and nothing else:
1. the main code (```python ... ```)
2. the requirements file (```requirements.txt ... ```)
3. a small pytest unit test verifying the main transformation function (```python test ... ```)

In the unit test, import functions from the main module by its module name. Do not include explanations or extra text."#;

/// User prompt template for code synthesis.
const CODE_SYNTHESIS_USER_TEMPLATE: &str = r#"The allowed packages are: {allowed_packages}.

Given the following pipeline specification:
{spec}

And the following data preview:
{preview}

All generated files belong to the pipeline `{pipeline_name}`: the main code is `{pipeline_name}.py`, the requirements file is `requirements.txt`, and the unit test is `{pipeline_name}_test.py`.

Generate the code, the requirements and the unit test now."#;

/// Feedback template appended when a prior attempt failed.
const RETRY_FEEDBACK_TEMPLATE: &str = r#"

The last generated code had the following error when executed:
{error}

Here is the last generated code:
{code}

This is the test code:
{test}

Please fix the code to resolve the error."#;

/// Build the user prompt for code synthesis.
///
/// `prior` carries the previous attempt's (code, test, error) verbatim so the
/// collaborator can correct its own output.
pub fn build_code_prompt(
    pipeline_name: &str,
    spec_json: &str,
    preview_json: &str,
    allowed_packages: &[&str],
    prior: Option<(&str, &str, &str)>,
) -> String {
    let mut prompt = CODE_SYNTHESIS_USER_TEMPLATE
        .replace("{allowed_packages}", &allowed_packages.join(", "))
        .replace("{spec}", spec_json)
        .replace("{preview}", preview_json)
        .replace("{pipeline_name}", pipeline_name);

    if let Some((code, test, error)) = prior {
        prompt.push_str(
            &RETRY_FEEDBACK_TEMPLATE
                .replace("{error}", error)
                .replace("{code}", code)
                .replace("{test}", test),
        );
    }

    prompt
}
