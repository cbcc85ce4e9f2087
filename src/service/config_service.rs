use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::crypto::envelope::SecretCipher;
use crate::domain::gateway_config::{
    GatewayConfig, GatewayConfigPatch, GatewayConfigView, StoredGatewayConfig, CONFIG_DESCRIPTION, CONFIG_KEY,
};
use crate::domain::order_id::OrderIdRange;
use crate::error::{PaymentError, PaymentResult};
use crate::gateways::{GatewayFactory, VposGateway};
use crate::repo::SettingsStore;
use crate::service::test_card_gate::normalize_test_card_list;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<GatewayConfigView>,
}

/// Lifecycle of the gateway credentials. Nothing is cached: every call reads the
/// settings row, so admin edits apply to the next request.
#[derive(Clone)]
pub struct PaymentConfigService {
    pub store: Arc<dyn SettingsStore>,
    pub cipher: SecretCipher,
    pub gateways: Arc<dyn GatewayFactory>,
}

impl PaymentConfigService {
    pub fn new(store: Arc<dyn SettingsStore>, cipher: SecretCipher, gateways: Arc<dyn GatewayFactory>) -> Self {
        Self { store, cipher, gateways }
    }

    async fn load_stored(&self) -> PaymentResult<Option<StoredGatewayConfig>> {
        let Some(value) = self
            .store
            .load_setting(CONFIG_KEY)
            .await
            .map_err(PaymentError::wrap("config_retrieval_error"))?
        else {
            return Ok(None);
        };

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| PaymentError::internal("config_retrieval_error", e))
    }

    fn reveal_password(&self, envelope: &str) -> String {
        if envelope.is_empty() {
            return String::new();
        }
        match self.cipher.decrypt(envelope) {
            Ok(password) => password,
            Err(err) => {
                tracing::warn!(error = %err, "stored gateway password unreadable, it must be re-entered");
                String::new()
            }
        }
    }

    /// The stored configuration with the password decrypted. An unreadable password comes
    /// back empty rather than failing the whole read.
    pub async fn get(&self) -> PaymentResult<Option<GatewayConfig>> {
        Ok(self.load_stored().await?.map(|stored| {
            let password = self.reveal_password(&stored.password);
            stored.into_config(password)
        }))
    }

    pub async fn save(&self, patch: GatewayConfigPatch) -> PaymentResult<GatewayConfig> {
        let existing = self.load_stored().await?;
        let was_active = existing.as_ref().is_some_and(|c| c.is_active);
        let mut stored = existing.unwrap_or_else(StoredGatewayConfig::empty);
        let now = Utc::now();

        let current_password = self.reveal_password(&stored.password);
        let password = match patch.password.filter(|p| !p.is_empty()) {
            Some(new_password) if new_password != current_password => {
                stored.password = self.cipher.encrypt(&new_password)?;
                new_password
            }
            _ => current_password,
        };

        if let Some(v) = patch.client_id {
            stored.client_id = v;
        }
        if let Some(v) = patch.username {
            stored.username = v;
        }
        if let Some(v) = patch.return_url {
            stored.return_url = v;
        }
        if let Some(v) = patch.callback_url {
            stored.callback_url = v;
        }
        if let Some(v) = patch.currency {
            stored.currency = v;
        }
        if let Some(v) = patch.test_card_strict_mode {
            stored.test_card_strict_mode = v;
        }
        if let Some(cards) = patch.allowed_test_cards {
            stored.allowed_test_cards = normalize_test_card_list(cards);
        }
        if let Some(v) = patch.order_id_min {
            stored.order_id_min = v;
        }
        if let Some(v) = patch.order_id_max {
            stored.order_id_max = v;
        }
        if let Some(active) = patch.is_active {
            if active && !was_active {
                stored.activated_at = Some(now);
            }
            stored.is_active = active;
        }
        if let Some(test_mode) = patch.test_mode {
            stored.test_mode = test_mode;
            stored.last_validated_at = Some(now);
        } else if patch.last_validated_at.is_some() {
            stored.last_validated_at = patch.last_validated_at;
        }

        // The check runs on the plaintext; an envelope that no longer decrypts counts as missing.
        if stored.client_id.trim().is_empty() || stored.username.trim().is_empty() || password.is_empty() {
            return Err(PaymentError::validation("Client ID, Username, and Password are required"));
        }
        if let (Some(_), Some(_)) = (stored.order_id_min, stored.order_id_max) {
            if OrderIdRange::new(stored.order_id_min, stored.order_id_max).is_none() {
                return Err(PaymentError::validation(ORDER_ID_RANGE_MESSAGE));
            }
        }

        self.persist(&stored).await
    }

    async fn persist(&self, stored: &StoredGatewayConfig) -> PaymentResult<GatewayConfig> {
        let value = serde_json::to_value(stored).map_err(|e| PaymentError::internal("config_save_error", e))?;
        self.store
            .upsert_setting(CONFIG_KEY, value, CONFIG_DESCRIPTION)
            .await
            .map_err(PaymentError::wrap("config_save_error"))?;

        tracing::info!(
            is_active = stored.is_active,
            test_mode = stored.test_mode,
            allowed_test_cards = stored.allowed_test_cards.len(),
            "payment gateway config saved"
        );

        self.get()
            .await?
            .ok_or_else(|| PaymentError::internal("config_save_error", "Failed to retrieve saved configuration"))
    }

    /// Field checks for an admin edit; an empty list means the patch is acceptable.
    pub fn validate(patch: &GatewayConfigPatch) -> Vec<String> {
        let mut errors = Vec::new();

        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());

        if blank(&patch.client_id) {
            errors.push("Client ID is required".to_string());
        }
        if blank(&patch.username) {
            errors.push("Username is required".to_string());
        }
        if blank(&patch.password) {
            errors.push("Password is required".to_string());
        }

        for (value, label) in [(&patch.return_url, "Return URL"), (&patch.callback_url, "Callback URL")] {
            if blank(value) {
                errors.push(format!("{label} is required"));
            } else if value.as_deref().is_some_and(|u| url::Url::parse(u.trim()).is_err()) {
                errors.push(format!("{label} must be a valid URL"));
            }
        }

        if blank(&patch.currency) {
            errors.push("Currency is required".to_string());
        }

        if let (Some(min), Some(max)) = patch.order_id_bounds() {
            if OrderIdRange::new(Some(min), Some(max)).is_none() {
                errors.push(ORDER_ID_RANGE_MESSAGE.to_string());
            }
        }

        errors
    }

    /// Switches payments off. Credentials are not re-checked, so a config whose
    /// password no longer decrypts can still be turned off.
    pub async fn deactivate(&self) -> PaymentResult<Option<GatewayConfig>> {
        let Some(mut stored) = self.load_stored().await? else {
            return Ok(None);
        };

        stored.is_active = false;
        let config = self.persist(&stored).await?;
        tracing::warn!("payment gateway deactivated");
        Ok(Some(config))
    }

    /// Proves the stored credentials against the bank and activates on success.
    /// A failed check leaves the stored state untouched.
    pub async fn validate_and_activate(&self) -> PaymentResult<ActivationOutcome> {
        let config = self.get().await?.ok_or(PaymentError::ConfigMissing)?;
        let gateway = self.gateway_for(&config)?;
        let check = gateway.test_connection().await;

        if !check.success {
            tracing::warn!(message = %check.message, "gateway credential check failed");
            return Ok(ActivationOutcome {
                success: false,
                message: check.message,
                config: None,
            });
        }

        let activated = self
            .save(GatewayConfigPatch {
                is_active: Some(true),
                last_validated_at: Some(Utc::now()),
                ..Default::default()
            })
            .await?;
        tracing::info!(sandbox = activated.test_mode, "payment gateway activated");

        Ok(ActivationOutcome {
            success: true,
            message: check.message,
            config: Some(activated.view()),
        })
    }

    /// Configuration a payment operation may run with.
    pub async fn active_config(&self) -> PaymentResult<GatewayConfig> {
        let config = self.get().await?.ok_or(PaymentError::ConfigMissing)?;
        if !config.is_active {
            return Err(PaymentError::ConfigInactive);
        }
        Ok(config)
    }

    pub fn gateway_for(&self, config: &GatewayConfig) -> PaymentResult<Arc<dyn VposGateway>> {
        self.gateways.build(config)
    }
}

const ORDER_ID_RANGE_MESSAGE: &str = "Order ID range must satisfy 0 < min < max";
