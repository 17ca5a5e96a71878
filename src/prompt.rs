//! System instruction and query construction.
//!
//! [`SYSTEM_PROMPT`] is part of the tool's observable behavior: any edit to its
//! wording must bump [`SYSTEM_PROMPT_VERSION`].

use crate::script_source::ScriptRequest;

pub const SYSTEM_PROMPT_VERSION: u32 = 1;

/// Conventional fence label of the target language.
pub const TARGET_LANGUAGE: &str = "python";

pub const SYSTEM_PROMPT: &str = "\
You are a code generation assistant. You turn a natural-language request into \
one complete Python 3 program.

Output rules:
1. Respond with a single complete, self-contained Python program that can be \
run immediately with the python3 interpreter. Put all imports at the top and \
call the entry point under `if __name__ == \"__main__\":`.
2. Output only code inside one ```python fenced block. Do not write any prose, \
explanation or second code block outside of it.
3. Prefer the Python standard library. If a third-party package is unavoidable, \
list it in a comment at the top of the program.
4. Add minimal error handling around file, directory and network operations, \
and report failures on stderr with a non-zero exit status.
5. Never delete, overwrite or move files, and never perform other destructive \
operations, unless the request explicitly asks for them.
6. The program runs with its working directory set to the folder containing \
the request; use relative paths for files the request mentions.
7. Print progress for long-running or batch work so the user can follow it.";

/// One chat-style request to the model provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelQuery {
    pub model: String,
    pub system: String,
    pub user: String,
}

/// Compose the query for `request`. The request text is passed unmodified.
pub fn build_query(request: &ScriptRequest, model: &str) -> ModelQuery {
    ModelQuery {
        model: model.to_string(),
        system: SYSTEM_PROMPT.to_string(),
        user: request.text().to_string(),
    }
}
