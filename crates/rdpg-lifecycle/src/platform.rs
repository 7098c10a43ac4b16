//! Platform command-line client
//!
//! Every platform action is a [`PlatformCommand`] run through a
//! [`PlatformClient`]. Exit code 0 means success; anything else is a
//! provisioning failure decided by the caller.

use crate::error::PlatformError;
use async_trait::async_trait;
use std::path::PathBuf;

/// `cf push` options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOptions {
    /// Memory limit, e.g. `256M`
    pub memory: String,
    /// Application directory
    pub path: PathBuf,
    /// Stack, if pinned
    pub stack: Option<String>,
    /// Stage without starting
    pub no_start: bool,
}

/// A platform action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCommand {
    /// Target an API endpoint
    Api {
        /// Endpoint URL
        endpoint: String,
        /// Skip TLS validation
        skip_ssl_validation: bool,
    },
    /// Authenticate
    Auth {
        /// User name
        user: String,
        /// Password (redacted in logs)
        password: String,
    },
    /// Create an org
    CreateOrg {
        /// Org name
        org: String,
    },
    /// Create a space inside an org
    CreateSpace {
        /// Owning org
        org: String,
        /// Space name
        space: String,
    },
    /// Target an org and space
    Target {
        /// Org name
        org: String,
        /// Space name
        space: String,
    },
    /// Delete an org and everything in it
    DeleteOrg {
        /// Org name
        org: String,
    },
    /// Push (and optionally start) an application
    Push {
        /// Application name
        app: String,
        /// Push options
        options: PushOptions,
    },
    /// Create a service instance
    CreateService {
        /// Service offering
        service: String,
        /// Plan name
        plan: String,
        /// Instance name
        instance: String,
    },
    /// Bind an instance to an application
    BindService {
        /// Application name
        app: String,
        /// Instance name
        instance: String,
    },
    /// Unbind an instance from an application
    UnbindService {
        /// Application name
        app: String,
        /// Instance name
        instance: String,
    },
    /// Delete a service instance
    DeleteService {
        /// Instance name
        instance: String,
        /// Skip confirmation
        force: bool,
    },
    /// Delete an application
    DeleteApp {
        /// Application name
        app: String,
        /// Skip confirmation
        force: bool,
    },
}

impl PlatformCommand {
    /// Arguments passed to `cf`
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        self.render(false)
    }

    /// Arguments as a loggable string, secrets redacted
    #[must_use]
    pub fn display_args(&self) -> String {
        self.render(true).join(" ")
    }

    fn render(&self, redact: bool) -> Vec<String> {
        let path: std::borrow::Cow<'_, str>;
        let parts: Vec<&str> = match self {
            PlatformCommand::Api {
                endpoint,
                skip_ssl_validation,
            } => {
                let mut parts = vec!["api", endpoint.as_str()];
                if *skip_ssl_validation {
                    parts.push("--skip-ssl-validation");
                }
                parts
            }
            PlatformCommand::Auth { user, password } => {
                let password = if redact { "<redacted>" } else { password.as_str() };
                vec!["auth", user.as_str(), password]
            }
            PlatformCommand::CreateOrg { org } => vec!["create-org", org.as_str()],
            PlatformCommand::CreateSpace { org, space } => {
                vec!["create-space", "-o", org.as_str(), space.as_str()]
            }
            PlatformCommand::Target { org, space } => {
                vec!["target", "-o", org.as_str(), "-s", space.as_str()]
            }
            PlatformCommand::DeleteOrg { org } => vec!["delete-org", "-f", org.as_str()],
            PlatformCommand::Push { app, options } => {
                path = options.path.to_string_lossy();
                let mut parts = vec![
                    "push",
                    app.as_str(),
                    "-m",
                    options.memory.as_str(),
                    "-p",
                    path.as_ref(),
                ];
                if let Some(stack) = &options.stack {
                    parts.extend(["-s", stack.as_str()]);
                }
                if options.no_start {
                    parts.push("--no-start");
                }
                parts
            }
            PlatformCommand::CreateService {
                service,
                plan,
                instance,
            } => vec![
                "create-service",
                service.as_str(),
                plan.as_str(),
                instance.as_str(),
            ],
            PlatformCommand::BindService { app, instance } => {
                vec!["bind-service", app.as_str(), instance.as_str()]
            }
            PlatformCommand::UnbindService { app, instance } => {
                vec!["unbind-service", app.as_str(), instance.as_str()]
            }
            PlatformCommand::DeleteService { instance, force } => {
                let mut parts = vec!["delete-service"];
                if *force {
                    parts.push("-f");
                }
                parts.push(instance.as_str());
                parts
            }
            PlatformCommand::DeleteApp { app, force } => {
                let mut parts = vec!["delete", app.as_str()];
                if *force {
                    parts.push("-f");
                }
                parts
            }
        };
        parts.into_iter().map(str::to_string).collect()
    }
}

/// Platform capability
///
/// Implement this trait to drive a platform. Returns the process exit code;
/// errors are reserved for failing to run the client at all.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Run one command to completion
    async fn execute(&self, command: &PlatformCommand) -> Result<i32, PlatformError>;
}

/// Runs the `cf` executable
///
/// Output is inherited so the platform's own progress shows in the run log.
/// The child is killed if the caller stops waiting for it.
#[derive(Debug, Clone)]
pub struct CfCli {
    program: PathBuf,
}

impl CfCli {
    /// Use `cf` from `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("cf")
    }

    /// Use a specific executable
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CfCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformClient for CfCli {
    async fn execute(&self, command: &PlatformCommand) -> Result<i32, PlatformError> {
        let status = tokio::process::Command::new(&self.program)
            .args(command.args())
            .kill_on_drop(true)
            .status()
            .await?;
        status.code().ok_or(PlatformError::Terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn push_options(no_start: bool) -> PushOptions {
        PushOptions {
            memory: "256M".to_string(),
            path: PathBuf::from("assets/postgres-test-app"),
            stack: Some("cflinuxfs2".to_string()),
            no_start,
        }
    }

    #[test]
    fn push_arguments() {
        let cmd = PlatformCommand::Push {
            app: "smoke".to_string(),
            options: push_options(true),
        };
        assert_eq!(
            cmd.args(),
            vec![
                "push",
                "smoke",
                "-m",
                "256M",
                "-p",
                "assets/postgres-test-app",
                "-s",
                "cflinuxfs2",
                "--no-start"
            ]
        );

        let started = PlatformCommand::Push {
            app: "smoke".to_string(),
            options: push_options(false),
        };
        assert!(!started.args().contains(&"--no-start".to_string()));
    }

    #[test]
    fn service_arguments() {
        let create = PlatformCommand::CreateService {
            service: "rdpg".to_string(),
            plan: "shared".to_string(),
            instance: "inst".to_string(),
        };
        assert_eq!(create.display_args(), "create-service rdpg shared inst");

        let delete = PlatformCommand::DeleteService {
            instance: "inst".to_string(),
            force: true,
        };
        assert_eq!(delete.display_args(), "delete-service -f inst");

        let unbind = PlatformCommand::UnbindService {
            app: "app".to_string(),
            instance: "inst".to_string(),
        };
        assert_eq!(unbind.args(), vec!["unbind-service", "app", "inst"]);

        let delete_app = PlatformCommand::DeleteApp {
            app: "app".to_string(),
            force: true,
        };
        assert_eq!(delete_app.display_args(), "delete app -f");
    }

    #[test]
    fn auth_password_is_redacted_for_display_only() {
        let auth = PlatformCommand::Auth {
            user: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        assert_eq!(auth.args(), vec!["auth", "admin", "hunter2"]);
        assert_eq!(auth.display_args(), "auth admin <redacted>");
    }

    #[test]
    fn context_arguments() {
        let api = PlatformCommand::Api {
            endpoint: "https://api.example.com".to_string(),
            skip_ssl_validation: true,
        };
        assert_eq!(
            api.display_args(),
            "api https://api.example.com --skip-ssl-validation"
        );
        let target = PlatformCommand::Target {
            org: "o".to_string(),
            space: "s".to_string(),
        };
        assert_eq!(target.display_args(), "target -o o -s s");
    }

    #[tokio::test]
    async fn cf_cli_reports_spawn_failure() {
        let cli = CfCli::with_program("/nonexistent/cf-binary");
        let err = cli
            .execute(&PlatformCommand::CreateOrg {
                org: "o".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Process(_)));
    }
}
