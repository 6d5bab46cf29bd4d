use crate::error::{ConfigError, ContextError, DeadlineExceeded};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    convert::TryFrom,
    env,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

pub(crate) const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
pub(crate) const DEADLINE_HEADER: &str = "lambda-runtime-deadline-ms";
pub(crate) const FUNCTION_ARN_HEADER: &str = "lambda-runtime-invoked-function-arn";
pub(crate) const TRACE_ID_HEADER: &str = "lambda-runtime-trace-id";
pub(crate) const CLIENT_CONTEXT_HEADER: &str = "lambda-runtime-client-context";
pub(crate) const COGNITO_IDENTITY_HEADER: &str = "lambda-runtime-cognito-identity";

/// Error payload posted to the platform when an invocation or the initialization fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Name of the error type.
    pub error_type: String,
    /// Human readable message.
    pub error_message: String,
}

/// Configuration derived from the environment the platform starts the process with.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// The host and port of the Runtime API.
    pub endpoint: String,
    /// The name of the function.
    pub function_name: String,
    /// The amount of memory available to the function in MB.
    pub memory: i32,
    /// The version of the function being executed.
    pub version: String,
    /// The name of the log stream for the function.
    pub log_stream: String,
    /// The name of the log group for the function.
    pub log_group: String,
    /// The `<module>.<function>` target the container was started with, if any.
    pub handler: Option<String>,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let memory = required("AWS_LAMBDA_FUNCTION_MEMORY_SIZE")?;
        let memory = match memory.trim().parse::<i32>() {
            Ok(mb) if mb >= 0 => mb,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "AWS_LAMBDA_FUNCTION_MEMORY_SIZE",
                    value: memory,
                })
            }
        };

        Ok(Config {
            endpoint: required("AWS_LAMBDA_RUNTIME_API")?,
            function_name: required("AWS_LAMBDA_FUNCTION_NAME")?,
            memory,
            version: required("AWS_LAMBDA_FUNCTION_VERSION")?,
            log_stream: required("AWS_LAMBDA_LOG_STREAM_NAME")?,
            log_group: required("AWS_LAMBDA_LOG_GROUP_NAME")?,
            handler: lookup("_HANDLER").filter(|h| !h.is_empty()),
        })
    }
}

/// Client context sent by the AWS Mobile SDK.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContext {
    /// Information about the mobile application invoking the function.
    #[serde(default)]
    pub client: ClientApplication,
    /// Custom properties attached to the mobile event context.
    #[serde(default)]
    pub custom: HashMap<String, String>,
    /// Environment settings from the mobile client.
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

/// AWS Mobile SDK client fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientApplication {
    /// The mobile app installation id.
    #[serde(default)]
    pub installation_id: String,
    /// The app title for the mobile app as registered with AWS' mobile services.
    #[serde(default)]
    pub app_title: String,
    /// The version name of the application as registered with AWS' mobile services.
    #[serde(default)]
    pub app_version_name: String,
    /// The app version code.
    #[serde(default)]
    pub app_version_code: String,
    /// The package name for the mobile application invoking the function.
    #[serde(default)]
    pub app_package_name: String,
}

/// Cognito identity information sent with the event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitoIdentity {
    /// The unique identity id for the Cognito credentials invoking the function.
    #[serde(default)]
    pub identity_id: String,
    /// The identity pool id the caller is "registered" with.
    #[serde(default)]
    pub identity_pool_id: String,
}

/// The read-only record describing the current invocation.
///
/// A `Context` is built by the runtime for every event and handed to the handler by
/// value; it exposes accessors only.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Context {
    request_id: String,
    deadline: u64,
    invoked_function_arn: String,
    xray_trace_id: Option<String>,
    client_context: Option<ClientContext>,
    identity: Option<CognitoIdentity>,
    env_config: Config,
    sequence: u64,
}

impl TryFrom<&HeaderMap> for Context {
    type Error = ContextError;

    fn try_from(headers: &HeaderMap) -> Result<Self, Self::Error> {
        let request_id = request_id(headers)?;
        let deadline = required_header(headers, DEADLINE_HEADER)?;
        let deadline = deadline.parse::<u64>().map_err(|err| ContextError::InvalidHeader {
            name: DEADLINE_HEADER,
            reason: err.to_string(),
        })?;

        Ok(Context {
            request_id,
            deadline,
            invoked_function_arn: optional_header(headers, FUNCTION_ARN_HEADER)?.unwrap_or_default(),
            xray_trace_id: optional_header(headers, TRACE_ID_HEADER)?,
            client_context: json_header(headers, CLIENT_CONTEXT_HEADER)?,
            identity: json_header(headers, COGNITO_IDENTITY_HEADER)?,
            ..Default::default()
        })
    }
}

impl Context {
    pub(crate) fn with_config(self, config: &Config) -> Self {
        Self {
            env_config: config.clone(),
            ..self
        }
    }

    pub(crate) fn with_sequence(self, sequence: u64) -> Self {
        Self { sequence, ..self }
    }

    pub(crate) fn local(request_id: String, budget: Duration, config: &Config) -> Self {
        let deadline = SystemTime::now() + budget;
        Context {
            request_id,
            deadline: millis_since_epoch(deadline),
            env_config: config.clone(),
            sequence: 1,
            ..Default::default()
        }
    }

    /// The id of the invocation, assigned by the platform.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Wall clock time at which the platform terminates the invocation.
    pub fn deadline(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.deadline)
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining_time(&self) -> Duration {
        self.deadline()
            .duration_since(SystemTime::now())
            .unwrap_or_else(|_| Duration::from_secs(0))
    }

    /// Fails when less than `required` remains before the deadline.
    ///
    /// The platform stops an invocation that runs past its deadline without notice, so
    /// handlers that want to finish cleanly check before starting work that may not fit.
    pub fn ensure_remaining(&self, required: Duration) -> Result<(), DeadlineExceeded> {
        let remaining = self.remaining_time();
        if remaining < required {
            Err(DeadlineExceeded::new(remaining, required))
        } else {
            Ok(())
        }
    }

    /// The ARN the caller used to invoke the function.
    pub fn invoked_function_arn(&self) -> &str {
        &self.invoked_function_arn
    }

    /// The X-Ray trace id for the invocation, if tracing is active.
    pub fn xray_trace_id(&self) -> Option<&str> {
        self.xray_trace_id.as_deref()
    }

    /// Mobile SDK client context, when the caller provided one.
    pub fn client_context(&self) -> Option<&ClientContext> {
        self.client_context.as_ref()
    }

    /// Cognito identity of the caller, when available.
    pub fn identity(&self) -> Option<&CognitoIdentity> {
        self.identity.as_ref()
    }

    /// Name of the function.
    pub fn function_name(&self) -> &str {
        &self.env_config.function_name
    }

    /// Version of the function.
    pub fn function_version(&self) -> &str {
        &self.env_config.version
    }

    /// Memory allocated to the execution environment, in MB.
    pub fn memory_limit_in_mb(&self) -> i32 {
        self.env_config.memory
    }

    /// Log stream the invocation writes to.
    pub fn log_stream_name(&self) -> &str {
        &self.env_config.log_stream
    }

    /// Log group the invocation writes to.
    pub fn log_group_name(&self) -> &str {
        &self.env_config.log_group
    }

    /// Position of this invocation in the execution environment, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// True for the first invocation served by a fresh execution environment.
    pub fn is_cold_start(&self) -> bool {
        self.sequence == 1
    }
}

pub(crate) fn request_id(headers: &HeaderMap) -> Result<String, ContextError> {
    required_header(headers, REQUEST_ID_HEADER).map(str::to_owned)
}

pub(crate) fn millis_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|since| since.as_millis() as u64)
        .unwrap_or(0)
}

fn required_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, ContextError> {
    optional_str(headers, name)?.ok_or(ContextError::MissingHeader(name))
}

fn optional_header(headers: &HeaderMap, name: &'static str) -> Result<Option<String>, ContextError> {
    Ok(optional_str(headers, name)?.map(str::to_owned))
}

fn optional_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, ContextError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value.to_str().map(Some).map_err(|err| ContextError::InvalidHeader {
            name,
            reason: err.to_string(),
        }),
    }
}

fn json_header<T>(headers: &HeaderMap, name: &'static str) -> Result<Option<T>, ContextError>
where
    T: for<'de> Deserialize<'de>,
{
    match optional_str(headers, name)? {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|err| ContextError::InvalidHeader {
                name,
                reason: err.to_string(),
            }),
    }
}
