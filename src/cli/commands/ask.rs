//! Ask Command
//!
//! Send one prompt through the model gateway and print the response.
//!
//! Usage:
//!   codetutor ask "Explain the cache module"
//!   codetutor ask --file prompt.txt --no-cache
//!   cat prompt.txt | codetutor ask

use std::io::Read;
use std::path::Path;

use crate::config::Config;
use crate::gateway::ModelGateway;
use crate::types::{Result, TutorError};

pub async fn run(
    config: &Config,
    prompt: Option<String>,
    file: Option<&Path>,
    no_cache: bool,
) -> Result<()> {
    let prompt = read_prompt(prompt, file)?;
    let gateway = ModelGateway::new(config)?;

    let response = gateway.complete_with_cache(&prompt, !no_cache).await?;
    println!("{}", response);
    Ok(())
}

/// Prompt from the argument, else the file, else stdin
fn read_prompt(prompt: Option<String>, file: Option<&Path>) -> Result<String> {
    let prompt = match (prompt, file) {
        (Some(prompt), _) => prompt,
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    if prompt.trim().is_empty() {
        return Err(TutorError::config(
            "Empty prompt: pass it as an argument, with --file, or on stdin",
        ));
    }
    Ok(prompt)
}
