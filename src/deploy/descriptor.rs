//! Deployment descriptor and Dockerfile rendering.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::DeployError;
use crate::config::{HEALTH_PATH, TOKEN_ENV_VAR};
use crate::health::HealthCheck;

/// Shape of a Telegram bot token (`<bot id>:<35 char secret>`).
static BOT_TOKEN_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b\d{6,12}:[A-Za-z0-9_-]{30,}\b").ok());

/// Process started by the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Binary built from this workspace.
    pub binary: String,

    /// Arguments passed on start.
    #[serde(default)]
    pub args: Vec<String>,
}

/// An environment variable the container needs.
///
/// Secrets are declared by name only and must be injected at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,

    /// Literal value baked into the image. Must be `None` for secrets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default)]
    pub secret: bool,
}

impl EnvVar {
    /// Declares a plain variable with a value.
    #[must_use]
    pub fn literal(name: &str, value: &str) -> Self {
        Self {
            name: name.to_owned(),
            value: Some(value.to_owned()),
            secret: false,
        }
    }

    /// Declares a secret supplied by the orchestrator.
    #[must_use]
    pub fn secret(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            value: None,
            secret: true,
        }
    }
}

/// Build-and-run recipe for the bot container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Toolchain image of the build stage.
    pub base_image: String,

    /// Slim image the binary runs in.
    pub runtime_image: String,

    /// Files copied and fetched before any source code, so the dependency
    /// layer stays cached across code changes.
    #[serde(default)]
    pub dependency_manifest: Vec<String>,

    pub entry_point: EntryPoint,

    #[serde(default)]
    pub environment: Vec<EnvVar>,

    /// Port the server process binds.
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
}

impl DeploymentConfig {
    /// Loads a descriptor from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Saves the descriptor to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), DeployError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Descriptor for the webhook server variant.
    #[must_use]
    pub fn example() -> Self {
        let port = 5000;
        Self {
            base_image: "rust:1.88-slim-bookworm".to_owned(),
            runtime_image: "debian:bookworm-slim".to_owned(),
            dependency_manifest: vec!["Cargo.toml".to_owned(), "Cargo.lock".to_owned()],
            entry_point: EntryPoint {
                binary: "memories_bot".to_owned(),
                args: vec!["--mode".to_owned(), "webhook".to_owned()],
            },
            environment: vec![
                EnvVar::secret(TOKEN_ENV_VAR),
                EnvVar::literal("RUST_LOG", "info"),
                EnvVar::literal("RENDER", "true"),
                EnvVar::literal("PORT", &port.to_string()),
            ],
            port,
            health_check: Some(HealthCheck {
                url: format!("http://localhost:{port}{HEALTH_PATH}"),
                ..HealthCheck::default()
            }),
        }
    }

    /// Names of the secrets the orchestrator must inject.
    pub fn secret_names(&self) -> impl Iterator<Item = &str> {
        self.environment
            .iter()
            .filter(|v| v.secret)
            .map(|v| v.name.as_str())
    }

    /// Validates the descriptor.
    ///
    /// # Errors
    ///
    /// Returns the first problem found. A secret never carries a value, and
    /// no literal value may look like a bot token.
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.base_image.trim().is_empty() || self.runtime_image.trim().is_empty() {
            return Err(DeployError::Invalid("image names cannot be empty".to_owned()));
        }

        if self.entry_point.binary.trim().is_empty() {
            return Err(DeployError::Invalid("entry point binary cannot be empty".to_owned()));
        }

        if self.port == 0 {
            return Err(DeployError::Invalid("port must be non-zero".to_owned()));
        }

        let mut seen = HashSet::new();
        for var in &self.environment {
            if var.name.is_empty() || var.name.contains(|c: char| c == '=' || c.is_whitespace()) {
                return Err(DeployError::Invalid(format!(
                    "invalid environment variable name '{}'",
                    var.name
                )));
            }

            if !seen.insert(var.name.as_str()) {
                return Err(DeployError::Invalid(format!(
                    "duplicate environment variable '{}'",
                    var.name
                )));
            }

            match (&var.value, var.secret) {
                (Some(_), true) => return Err(DeployError::SecretLiteral(var.name.clone())),
                (None, false) => {
                    return Err(DeployError::Invalid(format!(
                        "environment variable '{}' needs a value or must be marked secret",
                        var.name
                    )));
                }
                (Some(value), false) if looks_like_bot_token(value) => {
                    return Err(DeployError::SecretLiteral(var.name.clone()));
                }
                _ => {}
            }
        }

        if self.entry_point.args.iter().any(|a| looks_like_bot_token(a)) {
            return Err(DeployError::SecretLiteral("entry_point.args".to_owned()));
        }

        if let Some(check) = &self.health_check {
            if check.retries == 0 {
                return Err(DeployError::Invalid("health check retries must be at least 1".to_owned()));
            }
            if check.interval.is_zero() || check.timeout.is_zero() {
                return Err(DeployError::Invalid("health check interval and timeout must be non-zero".to_owned()));
            }
            if check.timeout > check.interval {
                return Err(DeployError::Invalid(
                    "health check timeout cannot exceed its interval".to_owned(),
                ));
            }
        }

        Ok(())
    }

    /// Renders a two-stage Dockerfile.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is invalid.
    pub fn render_dockerfile(&self) -> Result<String, DeployError> {
        self.validate()?;

        let binary = &self.entry_point.binary;
        let mut lines: Vec<String> = vec![
            "# Rendered by deployctl. Secrets are injected at runtime, never baked in.".to_owned(),
            format!("FROM {} AS builder", self.base_image),
            "WORKDIR /app".to_owned(),
        ];

        if !self.dependency_manifest.is_empty() {
            lines.push("\n# Dependency layer, cached until the manifest changes".to_owned());
            lines.push(format!("COPY {} ./", self.dependency_manifest.join(" ")));
            lines.push(
                "RUN mkdir -p src && echo 'fn main() {}' > src/main.rs && touch src/lib.rs && cargo fetch"
                    .to_owned(),
            );
        }

        lines.push("\nCOPY . .".to_owned());
        lines.push("RUN cargo build --release --bins".to_owned());

        lines.push(format!("\nFROM {}", self.runtime_image));
        lines.push(
            "RUN apt-get update && apt-get install -y --no-install-recommends ca-certificates && rm -rf /var/lib/apt/lists/*"
                .to_owned(),
        );
        lines.push(format!(
            "COPY --from=builder /app/target/release/{binary} /usr/local/bin/{binary}"
        ));
        if self.health_check.is_some() && binary != "deployctl" {
            lines.push(
                "COPY --from=builder /app/target/release/deployctl /usr/local/bin/deployctl".to_owned(),
            );
        }

        let literals: Vec<&EnvVar> = self.environment.iter().filter(|v| !v.secret).collect();
        if !literals.is_empty() {
            lines.push(String::new());
            for var in literals {
                let value = var.value.as_deref().unwrap_or_default();
                lines.push(format!("ENV {}={}", var.name, quote(value)));
            }
        }

        let secrets: Vec<&str> = self.secret_names().collect();
        if !secrets.is_empty() {
            lines.push(format!(
                "# Runtime secrets (set by the orchestrator): {}",
                secrets.join(", ")
            ));
        }

        lines.push(format!("\nEXPOSE {}", self.port));

        if let Some(check) = &self.health_check {
            lines.push(format!(
                "HEALTHCHECK --interval={}s --timeout={}s --start-period={}s --retries={} \\\n  CMD [\"deployctl\", \"probe\", \"--once\", \"--url\", \"{}\"]",
                check.interval.as_secs(),
                check.timeout.as_secs(),
                check.start_period.as_secs(),
                check.retries,
                check.url
            ));
        }

        let cmd: Vec<String> = std::iter::once(binary.as_str())
            .chain(self.entry_point.args.iter().map(String::as_str))
            .map(|part| format!("\"{}\"", part.replace('"', "\\\"")))
            .collect();
        lines.push(format!("\nCMD [{}]", cmd.join(", ")));

        let mut out = lines.join("\n");
        out.push('\n');
        Ok(out)
    }
}

/// Returns true when `value` contains something shaped like a bot token.
#[must_use]
pub fn looks_like_bot_token(value: &str) -> bool {
    BOT_TOKEN_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(value))
}

/// Quotes an `ENV` value when it contains spaces or quotes.
fn quote(value: &str) -> String {
    if value.is_empty() || value.contains(|c: char| c.is_whitespace() || c == '"') {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const FAKE_TOKEN: &str = "1234567890:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw";

    #[test]
    fn test_example_is_valid() {
        let config = DeploymentConfig::example();
        assert!(config.validate().is_ok());
        assert_eq!(config.secret_names().collect::<Vec<_>>(), vec![TOKEN_ENV_VAR]);
    }

    #[test]
    fn test_secret_with_value_rejected() {
        let mut config = DeploymentConfig::example();
        config.environment[0].value = Some("anything".to_owned());

        let err = config.validate().unwrap_err();
        assert!(matches!(err, DeployError::SecretLiteral(name) if name == TOKEN_ENV_VAR));
    }

    #[test]
    fn test_token_shaped_literal_rejected() {
        let mut config = DeploymentConfig::example();
        config
            .environment
            .push(EnvVar::literal("BOT_KEY", FAKE_TOKEN));

        assert!(matches!(
            config.validate().unwrap_err(),
            DeployError::SecretLiteral(_)
        ));
    }

    #[test]
    fn test_token_in_args_rejected() {
        let mut config = DeploymentConfig::example();
        config.entry_point.args.push(FAKE_TOKEN.to_owned());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_env_rejected() {
        let mut config = DeploymentConfig::example();
        config.environment.push(EnvVar::literal("RUST_LOG", "debug"));
        assert!(matches!(config.validate().unwrap_err(), DeployError::Invalid(_)));
    }

    #[test]
    fn test_health_check_bounds() {
        let mut config = DeploymentConfig::example();
        if let Some(check) = config.health_check.as_mut() {
            check.retries = 0;
        }
        assert!(config.validate().is_err());

        let mut config = DeploymentConfig::example();
        if let Some(check) = config.health_check.as_mut() {
            check.timeout = Duration::from_secs(60);
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_render_orders_manifest_before_sources() {
        let dockerfile = DeploymentConfig::example().render_dockerfile().unwrap();

        let manifest = dockerfile.find("COPY Cargo.toml Cargo.lock ./").unwrap();
        let fetch = dockerfile.find("cargo fetch").unwrap();
        let sources = dockerfile.find("COPY . .").unwrap();
        assert!(manifest < fetch && fetch < sources);
    }

    #[test]
    fn test_render_keeps_secrets_out() {
        let dockerfile = DeploymentConfig::example().render_dockerfile().unwrap();

        assert!(!dockerfile.contains(&format!("ENV {TOKEN_ENV_VAR}")));
        assert!(dockerfile.contains("ENV RUST_LOG=info"));
        assert!(dockerfile.contains("EXPOSE 5000"));
        assert!(dockerfile.contains("--interval=30s --timeout=10s --start-period=5s --retries=3"));
        assert!(dockerfile.contains("CMD [\"memories_bot\", \"--mode\", \"webhook\"]"));
        assert!(!looks_like_bot_token(&dockerfile));
    }

    #[test]
    fn test_render_empty_manifest_skips_dependency_layer() {
        let mut config = DeploymentConfig::example();
        config.dependency_manifest.clear();
        config.health_check = None;

        let dockerfile = config.render_dockerfile().unwrap();
        assert!(!dockerfile.contains("cargo fetch"));
        assert!(!dockerfile.contains("HEALTHCHECK"));
        assert!(dockerfile.contains("COPY . ."));
    }

    #[test]
    fn test_render_refuses_invalid() {
        let mut config = DeploymentConfig::example();
        config.environment.push(EnvVar::literal("TOKEN_COPY", FAKE_TOKEN));
        assert!(config.render_dockerfile().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.json");

        let config = DeploymentConfig::example();
        config.save_to_file(&path).unwrap();
        assert_eq!(DeploymentConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_checked_in_files_match_descriptor() {
        let descriptor: DeploymentConfig =
            serde_json::from_str(include_str!("../../deploy.json")).unwrap();
        assert_eq!(descriptor, DeploymentConfig::example());

        assert_eq!(
            descriptor.render_dockerfile().unwrap(),
            include_str!("../../Dockerfile")
        );
    }

    #[test]
    fn test_looks_like_bot_token() {
        assert!(looks_like_bot_token(FAKE_TOKEN));
        assert!(looks_like_bot_token(&format!("TOKEN={FAKE_TOKEN}")));
        assert!(!looks_like_bot_token("info"));
        assert!(!looks_like_bot_token("12:30:00"));
    }
}
