//! Operational configuration: a `clap` CLI overlaid on an optional YAML
//! file parsed with `serde` + `serde_yaml`, covering the knobs this
//! controller needs (API server location and auth, retry timing, driver
//! selection).
//!
//! Precedence, highest first: CLI flag, environment variable (`clap`'s
//! `env` attribute resolves these two together — a flag and its matching
//! env var can't be told apart once parsed, which is an accepted
//! simplification of "flags win over environment"), config file, built-in
//! default.

use std::path::PathBuf;

use clap::Parser;
use http::Uri;
use ipnet::IpNet;
use kuryr_drivers::{ConfiguredValues, DriverNames};
use kuryr_k8s_client::{AuthConfig, Config as ClientConfig};
use kuryr_runtime::RetryPolicy;
use serde::Deserialize;
use uuid::Uuid;

/// Command-line/environment surface. Every field the file can also supply
/// is `Option` here, with no `default_value`, so an absent CLI flag and
/// absent env var really mean "fall through to the file" rather than
/// silently winning with a baked-in default.
#[derive(Parser, Debug)]
#[command(name = "kuryr-k8s-controller", version, about)]
struct Cli {
    /// Path to a YAML file supplying any option not given on the command
    /// line or through its environment variable.
    #[arg(long, env = "KURYR_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Base URI of the Kubernetes API server, e.g. `https://10.0.0.1:6443`.
    #[arg(long, env = "KURYR_API_SERVER_URL")]
    api_server_url: Option<String>,

    /// Path to a bearer service-account token file.
    #[arg(long, env = "KURYR_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Path to a client certificate (PEM) for mTLS auth.
    #[arg(long, env = "KURYR_CLIENT_CERT")]
    client_cert: Option<PathBuf>,

    /// Path to the client certificate's private key (PEM).
    #[arg(long, env = "KURYR_CLIENT_KEY")]
    client_key: Option<PathBuf>,

    /// Path to a PEM bundle of additional trusted CA certificates.
    #[arg(long, env = "KURYR_CA_BUNDLE")]
    ca_bundle: Option<PathBuf>,

    /// Skip verifying the API server's certificate chain. Development use
    /// only.
    #[arg(long, env = "KURYR_INSECURE_SKIP_TLS_VERIFY")]
    insecure_skip_tls_verify: Option<bool>,

    /// Per-request timeout, in seconds, for GET and ANNOTATE calls.
    #[arg(long, env = "KURYR_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Upper bound on ANNOTATE's optimistic-concurrency retry loop.
    #[arg(long, env = "KURYR_ANNOTATE_MAX_ATTEMPTS")]
    annotate_max_attempts: Option<usize>,

    /// Total time budget, in seconds, the C3 retry wrapper gives a single
    /// handler invocation across all its `ResourceNotReady` retries.
    #[arg(long, env = "KURYR_RETRY_TIMEOUT_SECS")]
    retry_timeout_secs: Option<u64>,

    /// Base backoff interval, in seconds, for the C3 retry wrapper.
    #[arg(long, env = "KURYR_RETRY_INTERVAL_SECS")]
    retry_interval_secs: Option<u64>,

    /// Restricts Service/Endpoints watches to one namespace. Absent means
    /// watch across all namespaces.
    #[arg(long, env = "KURYR_NAMESPACE")]
    namespace: Option<String>,

    /// Driver alias for resolving a Service's OpenStack project.
    #[arg(long, env = "KURYR_SERVICE_PROJECT_DRIVER")]
    service_project_driver: Option<String>,

    /// Driver alias for resolving a Pod's OpenStack project.
    #[arg(long, env = "KURYR_POD_PROJECT_DRIVER")]
    pod_project_driver: Option<String>,

    /// Driver alias for resolving a Service's VIP subnet.
    #[arg(long, env = "KURYR_SERVICE_SUBNETS_DRIVER")]
    service_subnets_driver: Option<String>,

    /// Driver alias for resolving a Pod's subnet.
    #[arg(long, env = "KURYR_POD_SUBNETS_DRIVER")]
    pod_subnets_driver: Option<String>,

    /// Driver alias for resolving a Service's security groups.
    #[arg(long, env = "KURYR_SECURITY_GROUPS_DRIVER")]
    security_groups_driver: Option<String>,

    /// OpenStack project id the `"configured"` project driver answers with.
    #[arg(long, env = "KURYR_PROJECT_ID")]
    project_id: Option<String>,

    /// Network id the `"configured"` Service-subnet driver answers with.
    #[arg(long, env = "KURYR_SERVICE_NETWORK_ID")]
    service_network_id: Option<Uuid>,

    /// Subnet id the `"configured"` Service-subnet driver answers with.
    #[arg(long, env = "KURYR_SERVICE_SUBNET_ID")]
    service_subnet_id: Option<Uuid>,

    /// CIDR of the Service subnet, e.g. `10.0.0.0/24`.
    #[arg(long, env = "KURYR_SERVICE_SUBNET_CIDR")]
    service_subnet_cidr: Option<IpNet>,

    /// Network id the `"configured"` Pod-subnet driver answers with.
    #[arg(long, env = "KURYR_POD_NETWORK_ID")]
    pod_network_id: Option<Uuid>,

    /// Subnet id the `"configured"` Pod-subnet driver answers with.
    #[arg(long, env = "KURYR_POD_SUBNET_ID")]
    pod_subnet_id: Option<Uuid>,

    /// CIDR of the Pod subnet, e.g. `10.1.0.0/24`.
    #[arg(long, env = "KURYR_POD_SUBNET_CIDR")]
    pod_subnet_cidr: Option<IpNet>,

    /// Security group ids attached to every Service load balancer,
    /// comma-separated.
    #[arg(long, env = "KURYR_SECURITY_GROUPS_IDS", value_delimiter = ',')]
    security_groups_ids: Option<Vec<Uuid>>,
}

/// The same fields as [`Cli`], read from an optional YAML file. Field
/// names match the CLI's long-option names (in `snake_case`, as YAML keys
/// naturally are) so the two overlay without a translation table.
#[derive(Deserialize, Debug, Default)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    api_server_url: Option<String>,
    token_file: Option<PathBuf>,
    client_cert: Option<PathBuf>,
    client_key: Option<PathBuf>,
    ca_bundle: Option<PathBuf>,
    insecure_skip_tls_verify: Option<bool>,
    request_timeout_secs: Option<u64>,
    annotate_max_attempts: Option<usize>,
    retry_timeout_secs: Option<u64>,
    retry_interval_secs: Option<u64>,
    namespace: Option<String>,
    service_project_driver: Option<String>,
    pod_project_driver: Option<String>,
    service_subnets_driver: Option<String>,
    pod_subnets_driver: Option<String>,
    security_groups_driver: Option<String>,
    project_id: Option<String>,
    service_network_id: Option<Uuid>,
    service_subnet_id: Option<Uuid>,
    service_subnet_cidr: Option<IpNet>,
    pod_network_id: Option<Uuid>,
    pod_subnet_id: Option<Uuid>,
    pod_subnet_cidr: Option<IpNet>,
    security_groups_ids: Option<Vec<Uuid>>,
}

/// Everything `main` needs to build the client, the driver registry, and
/// the retry policy, fully resolved from CLI/env/file/defaults.
#[derive(Debug)]
pub struct Settings {
    pub client: ClientConfig,
    pub driver_names: DriverNames,
    pub configured_values: ConfiguredValues,
    pub retry_policy: RetryPolicy,
    /// `None` watches Services/Endpoints across every namespace.
    pub namespace: Option<String>,
}

/// Failure building [`Settings`] from the command line, environment, and
/// config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("missing required option {0:?} (set it on the command line, via its environment variable, or in the config file)")]
    Missing(&'static str),
    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
    #[error("exactly one of --token-file or --client-cert/--client-key must be set, got {0}")]
    AmbiguousAuth(&'static str),
}

impl Settings {
    /// Parses `Cli` from `std::env::args`, loads `--config-file` if given,
    /// and merges the two into a fully-resolved `Settings`.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = Cli::parse();
        Self::from_cli(cli)
    }

    fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config_file {
            Some(path) => load_file(path)?,
            None => FileConfig::default(),
        };

        let api_server_url = require(
            "api_server_url",
            cli.api_server_url.or(file.api_server_url),
        )?;
        let base_uri: Uri = api_server_url
            .parse()
            .map_err(|e| ConfigError::Invalid {
                field: "api_server_url",
                message: format!("{e}"),
            })?;

        let auth = resolve_auth(&cli, &file)?;
        let mut client = ClientConfig::new(base_uri, auth);
        client.ca_bundle = cli.ca_bundle.or(file.ca_bundle);
        client.insecure_skip_tls_verify = cli
            .insecure_skip_tls_verify
            .or(file.insecure_skip_tls_verify)
            .unwrap_or(false);
        if let Some(secs) = cli.request_timeout_secs.or(file.request_timeout_secs) {
            client.request_timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(n) = cli.annotate_max_attempts.or(file.annotate_max_attempts) {
            client.annotate_max_attempts = n;
        }

        let retry_policy = RetryPolicy::from_secs(
            cli.retry_timeout_secs.or(file.retry_timeout_secs).unwrap_or(60),
            cli.retry_interval_secs.or(file.retry_interval_secs).unwrap_or(1),
        );

        let mut driver_names = DriverNames::default();
        if let Some(v) = cli.service_project_driver.or(file.service_project_driver) {
            driver_names.service_project = v;
        }
        if let Some(v) = cli.pod_project_driver.or(file.pod_project_driver) {
            driver_names.pod_project = v;
        }
        if let Some(v) = cli.service_subnets_driver.or(file.service_subnets_driver) {
            driver_names.service_subnets = v;
        }
        if let Some(v) = cli.pod_subnets_driver.or(file.pod_subnets_driver) {
            driver_names.pod_subnets = v;
        }
        if let Some(v) = cli.security_groups_driver.or(file.security_groups_driver) {
            driver_names.security_groups = v;
        }

        let project_id = require("project_id", cli.project_id.or(file.project_id))?;
        let service_network_id = require(
            "service_network_id",
            cli.service_network_id.or(file.service_network_id),
        )?;
        let service_subnet_id = require(
            "service_subnet_id",
            cli.service_subnet_id.or(file.service_subnet_id),
        )?;
        let service_subnet_cidr = require(
            "service_subnet_cidr",
            cli.service_subnet_cidr.or(file.service_subnet_cidr),
        )?;
        let pod_network_id = require("pod_network_id", cli.pod_network_id.or(file.pod_network_id))?;
        let pod_subnet_id = require("pod_subnet_id", cli.pod_subnet_id.or(file.pod_subnet_id))?;
        let pod_subnet_cidr = require(
            "pod_subnet_cidr",
            cli.pod_subnet_cidr.or(file.pod_subnet_cidr),
        )?;
        let security_groups_ids = cli
            .security_groups_ids
            .or(file.security_groups_ids)
            .unwrap_or_default();

        let configured_values = ConfiguredValues {
            project_id,
            service_network_id,
            service_subnet: kuryr_drivers::Subnet {
                id: service_subnet_id,
                cidr: service_subnet_cidr,
            },
            pod_network_id,
            pod_subnet: kuryr_drivers::Subnet {
                id: pod_subnet_id,
                cidr: pod_subnet_cidr,
            },
            security_groups_ids,
        };

        Ok(Settings {
            client,
            driver_names,
            configured_values,
            retry_policy,
            namespace: cli.namespace.or(file.namespace),
        })
    }
}

fn resolve_auth(cli: &Cli, file: &FileConfig) -> Result<AuthConfig, ConfigError> {
    let token_file = cli.token_file.clone().or_else(|| file.token_file.clone());
    let cert = cli.client_cert.clone().or_else(|| file.client_cert.clone());
    let key = cli.client_key.clone().or_else(|| file.client_key.clone());

    match (token_file, cert, key) {
        (Some(token_file), None, None) => Ok(AuthConfig::Bearer { token_file }),
        (None, Some(cert_path), Some(key_path)) => Ok(AuthConfig::ClientCertificate { cert_path, key_path }),
        (None, None, None) => Err(ConfigError::Missing("token_file or client_cert/client_key")),
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
            Err(ConfigError::AmbiguousAuth("both bearer token and client certificate configured"))
        }
        (None, Some(_), None) | (None, None, Some(_)) => {
            Err(ConfigError::AmbiguousAuth("client_cert and client_key must both be set"))
        }
    }
}

fn require<T>(field: &'static str, value: Option<T>) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::Missing(field))
}

fn load_file(path: &PathBuf) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.clone(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::ParseFile {
        path: path.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            config_file: None,
            api_server_url: Some("https://10.0.0.1:6443".to_string()),
            token_file: Some(PathBuf::from("/var/run/secrets/token")),
            client_cert: None,
            client_key: None,
            ca_bundle: None,
            insecure_skip_tls_verify: None,
            request_timeout_secs: None,
            annotate_max_attempts: None,
            retry_timeout_secs: None,
            retry_interval_secs: None,
            namespace: None,
            service_project_driver: None,
            pod_project_driver: None,
            service_subnets_driver: None,
            pod_subnets_driver: None,
            security_groups_driver: None,
            project_id: Some("proj-1".to_string()),
            service_network_id: Some(Uuid::new_v4()),
            service_subnet_id: Some(Uuid::new_v4()),
            service_subnet_cidr: Some("10.0.0.0/24".parse().unwrap()),
            pod_network_id: Some(Uuid::new_v4()),
            pod_subnet_id: Some(Uuid::new_v4()),
            pod_subnet_cidr: Some("10.1.0.0/24".parse().unwrap()),
            security_groups_ids: None,
        }
    }

    #[test]
    fn builds_settings_from_cli_alone() {
        let settings = Settings::from_cli(base_cli()).unwrap();
        assert!(matches!(settings.client.auth, AuthConfig::Bearer { .. }));
        assert_eq!(settings.driver_names.service_project, "configured");
        assert_eq!(settings.configured_values.project_id, "proj-1");
    }

    #[test]
    fn rejects_both_bearer_and_client_cert_auth() {
        let mut cli = base_cli();
        cli.client_cert = Some(PathBuf::from("/cert.pem"));
        cli.client_key = Some(PathBuf::from("/key.pem"));
        let err = Settings::from_cli(cli).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousAuth(_)));
    }

    #[test]
    fn rejects_no_auth_method_configured() {
        let mut cli = base_cli();
        cli.token_file = None;
        let err = Settings::from_cli(cli).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn rejects_missing_required_field() {
        let mut cli = base_cli();
        cli.project_id = None;
        let err = Settings::from_cli(cli).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("project_id")));
    }

    #[test]
    fn cli_value_wins_over_file_value() {
        let mut cli = base_cli();
        cli.config_file = None;
        cli.namespace = Some("from-cli".to_string());
        let settings = Settings::from_cli(cli).unwrap();
        assert_eq!(settings.namespace.as_deref(), Some("from-cli"));
    }

    #[test]
    fn deserializes_a_file() {
        let yaml = "api_server_url: https://10.0.0.1:6443\nnamespace: prod\n";
        let file: FileConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.api_server_url.as_deref(), Some("https://10.0.0.1:6443"));
        assert_eq!(file.namespace.as_deref(), Some("prod"));
    }
}
