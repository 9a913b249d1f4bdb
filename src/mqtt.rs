use crate::config::MqttConfig;
use anyhow::{Context, Result};
use log::*;
use paho_mqtt as mqtt;
use stagg_ekg_lib::protocol::{Field, KettleState};

const TOPIC_PREFIX: &str = "stagg";
const APPENDIX_AVAILABILITY: &str = "availability";
const ONLINE: &str = "online";
const OFFLINE: &str = "offline";

fn topic(entity_id: Option<&str>, appendix: &str) -> String {
    match entity_id {
        Some(entity_id) => format!("{TOPIC_PREFIX}/{entity_id}/{appendix}"),
        None => format!("{TOPIC_PREFIX}/{appendix}"),
    }
}

/// Publishes kettle state fields as retained messages, one topic per field.
pub struct Publisher {
    client: mqtt::AsyncClient,
    config: MqttConfig,
}

impl Publisher {
    /// Connects to the broker, with the availability topic as last will.
    pub async fn connect(config: &MqttConfig) -> Result<Self> {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("kettlectl-{}", std::process::id()));
        let create_opts = mqtt::CreateOptionsBuilder::new()
            .server_uri(config.url.as_str())
            .client_id(client_id)
            .finalize();
        let client = mqtt::AsyncClient::new(create_opts)
            .with_context(|| format!("Error creating mqtt client for {}", config.url))?;

        let availability = topic(config.entity_id.as_deref(), APPENDIX_AVAILABILITY);
        let mut conn_builder = mqtt::ConnectOptionsBuilder::new();
        conn_builder
            .keep_alive_interval(config.keep_alive)
            .clean_session(true)
            .will_message(mqtt::Message::new_retained(
                availability,
                OFFLINE,
                config.qos(),
            ));
        if let Some(user_name) = &config.username {
            conn_builder.user_name(user_name.as_str());
        }
        if let Some(password) = &config.password {
            conn_builder.password(password.as_str());
        }

        client
            .connect(conn_builder.finalize())
            .await
            .with_context(|| format!("Mqtt client unable to connect to {}", config.url))?;
        info!("Connected to mqtt broker {}", config.url);

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn send(&self, appendix: &str, payload: String) -> Result<()> {
        let topic = topic(self.config.entity_id.as_deref(), appendix);
        trace!("Publishing {topic}: {payload}");
        self.client
            .publish(mqtt::Message::new_retained(
                topic.as_str(),
                payload,
                self.config.qos(),
            ))
            .await
            .with_context(|| format!("Cannot publish mqtt message to {topic}"))
    }

    /// Publishes `online` or `offline` on the availability topic.
    pub async fn set_available(&self, available: bool) -> Result<()> {
        let payload = if available { ONLINE } else { OFFLINE };
        self.send(APPENDIX_AVAILABILITY, payload.to_string()).await
    }

    /// Publishes each field on its own topic.
    pub async fn publish(&self, state: &KettleState, fields: &[Field]) -> Result<()> {
        for field in fields {
            self.send(field.key(), state.project(*field).to_string())
                .await?;
        }
        Ok(())
    }

    /// Marks the entity offline and disconnects.
    pub async fn disconnect(self) -> Result<()> {
        self.set_available(false).await?;
        self.client
            .disconnect(None)
            .await
            .with_context(|| "Error disconnect mqtt client")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics() {
        assert_eq!(topic(Some("kitchen"), "target_temp"), "stagg/kitchen/target_temp");
        assert_eq!(topic(None, APPENDIX_AVAILABILITY), "stagg/availability");
    }
}
