//! Reading configuration files and resolving environment references.

use crate::{Config, ConfigError};
use regex::Regex;
use std::path::Path;

/// Configuration files above this size are rejected before the regex runs.
const MAX_INPUT_SIZE: usize = 1024 * 1024;

/// Replaces `${VAR}` with the value of `VAR` and `${VAR:-default}` with the
/// value of `VAR` or `default` when it is unset.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut resolved = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)));
			},
		};
		resolved.push_str(&input[last..whole.start()]);
		resolved.push_str(&value);
		last = whole.end();
	}
	resolved.push_str(&input[last..]);

	Ok(resolved)
}

/// Reads, resolves, parses and validates the file at `path`.
pub(crate) async fn load_file(path: &Path) -> Result<Config, ConfigError> {
	let content = tokio::fs::read_to_string(path).await.map_err(|e| {
		ConfigError::Io(std::io::Error::new(
			e.kind(),
			format!("Cannot read {}: {}", path.display(), e),
		))
	})?;
	content.parse()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("RELAY_TEST_HOST", "localhost");
		std::env::set_var("RELAY_TEST_PORT", "8545");

		let input = "rpc_url = \"http://${RELAY_TEST_HOST}:${RELAY_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "rpc_url = \"http://localhost:8545\"");

		std::env::remove_var("RELAY_TEST_HOST");
		std::env::remove_var("RELAY_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "passphrase = \"${RELAY_TEST_UNSET_PASS:-secret}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "passphrase = \"secret\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let result = resolve_env_vars("key = \"${RELAY_TEST_UNSET_KEY}\"");
		assert!(result.unwrap_err().to_string().contains("RELAY_TEST_UNSET_KEY"));
	}

	#[test]
	fn test_lowercase_is_left_alone() {
		let input = "id = \"${not_a_var}\"";
		assert_eq!(resolve_env_vars(input).unwrap(), input);
	}

	#[test]
	fn test_oversized_input_rejected() {
		let input = "#".repeat(MAX_INPUT_SIZE + 1);
		assert!(matches!(
			resolve_env_vars(&input),
			Err(ConfigError::Validation(_))
		));
	}
}
