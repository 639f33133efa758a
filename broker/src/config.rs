use std::fmt;
use std::str::FromStr;

use crate::BrokerError;

pub const DEFAULT_KAFKA_TOPIC: &str = "pipeline-actions";
pub const DEFAULT_KAFKA_CONSUMER_GROUP: &str = "pipeline-actions-group";
pub const DEFAULT_NATS_STREAM: &str = "PIPELINE_ACTIONS";
pub const DEFAULT_NATS_SUBJECT: &str = "pipeline.actions";
pub const DEFAULT_NATS_DURABLE: &str = "pipeline-actions-worker";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BrokerType {
    #[default]
    Kafka,
    Sqs,
    Nats,
}

impl fmt::Display for BrokerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BrokerType::Kafka => "kafka",
            BrokerType::Sqs => "sqs",
            BrokerType::Nats => "nats",
        };

        f.write_str(name)
    }
}

impl FromStr for BrokerType {
    type Err = BrokerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "kafka" => Ok(BrokerType::Kafka),
            "sqs" => Ok(BrokerType::Sqs),
            "nats" => Ok(BrokerType::Nats),
            other => Err(BrokerError::UnknownBrokerType(other.to_string())),
        }
    }
}

/// Transport selection and credentials, read from the environment.
///
/// Expected environment variables:
/// - MESSAGE_BROKER_TYPE (optional, `kafka` | `sqs` | `nats`, default: kafka)
/// - KAFKA_BROKER_URLS (required for kafka, comma separated)
/// - KAFKA_TOPIC (optional, default: pipeline-actions)
/// - KAFKA_CONSUMER_GROUP (optional, default: pipeline-actions-group)
/// - SQS_AWS_REGION, SQS_QUEUE_URL (required for sqs)
/// - NATS_URL (required for nats)
/// - NATS_STREAM, NATS_SUBJECT, NATS_DURABLE (optional)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub broker_type: BrokerType,
    pub kafka_broker_urls: Vec<String>,
    pub kafka_topic: String,
    pub kafka_consumer_group: String,
    pub sqs_aws_region: Option<String>,
    pub sqs_queue_url: Option<String>,
    pub nats_url: Option<String>,
    pub nats_stream: String,
    pub nats_subject: String,
    pub nats_durable: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            broker_type: BrokerType::default(),
            kafka_broker_urls: Vec::new(),
            kafka_topic: DEFAULT_KAFKA_TOPIC.to_string(),
            kafka_consumer_group: DEFAULT_KAFKA_CONSUMER_GROUP.to_string(),
            sqs_aws_region: None,
            sqs_queue_url: None,
            nats_url: None,
            nats_stream: DEFAULT_NATS_STREAM.to_string(),
            nats_subject: DEFAULT_NATS_SUBJECT.to_string(),
            nats_durable: DEFAULT_NATS_DURABLE.to_string(),
        }
    }
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self, BrokerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds and validates the configuration from any key lookup. Blank
    /// values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BrokerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let broker_type = match var("MESSAGE_BROKER_TYPE") {
            Some(value) => value.parse()?,
            None => BrokerType::default(),
        };

        let kafka_broker_urls = var("KAFKA_BROKER_URLS")
            .map(|urls| {
                urls.split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            broker_type,
            kafka_broker_urls,
            kafka_topic: var("KAFKA_TOPIC").unwrap_or(defaults.kafka_topic),
            kafka_consumer_group: var("KAFKA_CONSUMER_GROUP")
                .unwrap_or(defaults.kafka_consumer_group),
            sqs_aws_region: var("SQS_AWS_REGION"),
            sqs_queue_url: var("SQS_QUEUE_URL"),
            nats_url: var("NATS_URL"),
            nats_stream: var("NATS_STREAM").unwrap_or(defaults.nats_stream),
            nats_subject: var("NATS_SUBJECT").unwrap_or(defaults.nats_subject),
            nats_durable: var("NATS_DURABLE").unwrap_or(defaults.nats_durable),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BrokerError> {
        match self.broker_type {
            BrokerType::Kafka => {
                if self.kafka_broker_urls.is_empty() {
                    return Err(BrokerError::MissingConfig(
                        "KAFKA_BROKER_URLS",
                        self.broker_type,
                    ));
                }
            }
            BrokerType::Sqs => {
                if self.sqs_aws_region.is_none() {
                    return Err(BrokerError::MissingConfig("SQS_AWS_REGION", self.broker_type));
                }

                if self.sqs_queue_url.is_none() {
                    return Err(BrokerError::MissingConfig("SQS_QUEUE_URL", self.broker_type));
                }
            }
            BrokerType::Nats => {
                if self.nats_url.is_none() {
                    return Err(BrokerError::MissingConfig("NATS_URL", self.broker_type));
                }
            }
        }

        Ok(())
    }
}
