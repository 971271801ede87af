//! Plugin metadata advertised to the gateway on `GET /config`

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// How the front end drives a login with this plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthenticationMethod {
    /// Browser is redirected to the identity provider
    #[default]
    #[serde(rename = "IDP-URI-REDIRECTION")]
    IdpUriRedirection,
    #[serde(rename = "PASSWORD")]
    Password,
    #[serde(rename = "QR-CODE")]
    QrCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPluginConfig {
    /// Unique plugin key, letters and `-` only
    pub key: String,
    pub name: String,
    pub icon_url: String,
    #[serde(default)]
    pub authentication_method: AuthenticationMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_form_extra_info_heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_form_extra_info_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_form_username_field_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_form_password_field_label: Option<String>,

    /// Required for `QR-CODE`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_img_data_request_url: Option<String>,
    /// Required for `QR-CODE`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_auth_result_poll_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_extra_info_heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_extra_info_content: Option<String>,
}

impl AuthPluginConfig {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        icon_url: impl Into<String>,
        authentication_method: AuthenticationMethod,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            icon_url: icon_url.into(),
            authentication_method,
            login_form_extra_info_heading: None,
            login_form_extra_info_content: None,
            login_form_username_field_label: None,
            login_form_password_field_label: None,
            qr_code_img_data_request_url: None,
            qr_code_auth_result_poll_url: None,
            qr_code_extra_info_heading: None,
            qr_code_extra_info_content: None,
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.key.is_empty()
            || !self
                .key
                .chars()
                .all(|c| c.is_ascii_alphabetic() || c == '-')
        {
            return Err(AuthError::Config(format!(
                "plugin key {:?} may only contain letters and '-'",
                self.key
            )));
        }
        if self.authentication_method == AuthenticationMethod::QrCode
            && (self.qr_code_img_data_request_url.is_none()
                || self.qr_code_auth_result_poll_url.is_none())
        {
            return Err(AuthError::Config(
                "QR-CODE plugins need qrCodeImgDataRequestUrl and qrCodeAuthResultPollUrl"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_gateway_contract() {
        let config = AuthPluginConfig::new(
            "google",
            "Google",
            "/icon.svg",
            AuthenticationMethod::IdpUriRedirection,
        );
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "key": "google",
                "name": "Google",
                "iconUrl": "/icon.svg",
                "authenticationMethod": "IDP-URI-REDIRECTION"
            })
        );
    }

    #[test]
    fn test_key_characters() {
        let mut config =
            AuthPluginConfig::new("my-plugin", "Mine", "/icon.svg", AuthenticationMethod::Password);
        assert!(config.validate().is_ok());

        config.key = "my_plugin1".to_string();
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }

    #[test]
    fn test_qr_code_requires_urls() {
        let mut config =
            AuthPluginConfig::new("qr", "QR", "/icon.svg", AuthenticationMethod::QrCode);
        assert!(config.validate().is_err());

        config.qr_code_img_data_request_url = Some("/qr/img".to_string());
        config.qr_code_auth_result_poll_url = Some("/qr/poll".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_method_round_trip_names() {
        let method: AuthenticationMethod = serde_json::from_str("\"QR-CODE\"").unwrap();
        assert_eq!(method, AuthenticationMethod::QrCode);
    }
}
