//! Delivery of messages to channels and users.

use crate::BotConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("message to {destination} was rejected: {description}")]
    Rejected {
        destination: String,
        description: String,
    },
}

/// Trait that needs to be implemented by a message transport.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Sends `text` to `destination`, which is a channel name like `@club` or a user's chat id.
    async fn send(&self, destination: &str, text: &str) -> Result<(), DeliveryError>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// A `Delivery` using the Telegram bot API.
#[derive(Debug)]
pub struct TelegramDelivery {
    client: reqwest::Client,
    send_message_url: String,
}

impl TelegramDelivery {
    pub fn new(config: &BotConfig) -> Result<TelegramDelivery, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(TelegramDelivery {
            client,
            send_message_url: format!(
                "{}/bot{}/sendMessage",
                config.api_url.trim_end_matches('/'),
                config.token
            ),
        })
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    async fn send(&self, destination: &str, text: &str) -> Result<(), DeliveryError> {
        log::debug!("sending {} bytes to {}", text.len(), destination);

        // The API answers with a JSON body on errors too, so the status code is not checked.
        let response: ApiResponse = self
            .client
            .post(&self.send_message_url)
            .json(&SendMessage {
                chat_id: destination,
                text,
            })
            .send()
            .await?
            .json()
            .await?;

        check_response(destination, response)
    }
}

fn check_response(destination: &str, response: ApiResponse) -> Result<(), DeliveryError> {
    if response.ok {
        return Ok(());
    }

    Err(DeliveryError::Rejected {
        destination: destination.to_owned(),
        description: response
            .description
            .unwrap_or_else(|| "no description".into()),
    })
}

/// A `Delivery` that keeps all messages in memory.
#[derive(Debug, Default)]
pub struct RecordingDelivery {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingDelivery {
    pub fn new() -> RecordingDelivery {
        RecordingDelivery::default()
    }

    /// The `(destination, text)` pairs sent so far.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// The texts sent to `destination` so far.
    pub fn messages_to(&self, destination: &str) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(to, _)| to == destination)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn send(&self, destination: &str, text: &str) -> Result<(), DeliveryError> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((destination.to_owned(), text.to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl<T> Delivery for Box<T>
where
    T: Delivery + ?Sized,
{
    async fn send(&self, destination: &str, text: &str) -> Result<(), DeliveryError> {
        (**self).send(destination, text).await
    }
}

#[async_trait]
impl<T> Delivery for Arc<T>
where
    T: Delivery + ?Sized,
{
    async fn send(&self, destination: &str, text: &str) -> Result<(), DeliveryError> {
        (**self).send(destination, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_url() {
        let delivery = TelegramDelivery::new(&BotConfig {
            token: "123:abc".into(),
            api_url: "https://api.telegram.org/".into(),
            timeout_secs: 5,
        })
        .unwrap();

        assert_eq!(
            delivery.send_message_url,
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn api_responses() {
        let ok: ApiResponse = serde_json::from_str(r#"{"ok":true,"result":{}}"#).unwrap();
        assert!(check_response("@club", ok).is_ok());

        let rejected: ApiResponse = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap();

        match check_response("@club", rejected) {
            Err(DeliveryError::Rejected {
                destination,
                description,
            }) => {
                assert_eq!(destination, "@club");
                assert_eq!(description, "Bad Request: chat not found");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn request_body() {
        let body = serde_json::to_string(&SendMessage {
            chat_id: "@club",
            text: "hello",
        })
        .unwrap();

        assert_eq!(body, r#"{"chat_id":"@club","text":"hello"}"#);
    }

    #[actix_rt::test]
    async fn recording_delivery() {
        let delivery = Arc::new(RecordingDelivery::new());

        delivery.send("@club", "one").await.unwrap();
        delivery.send("42", "two").await.unwrap();

        assert_eq!(delivery.messages_to("@club"), vec!["one".to_owned()]);
        assert_eq!(delivery.messages().len(), 2);
    }
}
