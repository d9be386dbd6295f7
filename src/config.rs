use std::time::Duration;

use anyhow::{bail, Context};

use crate::notify::email::EmailConfig;
use crate::notify::push::DEFAULT_PUSH_ENDPOINT;
use crate::payment::stripe::StripeConfig;
use crate::reconciler::{CheckoutSettings, PromoCode};

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// `None` runs on in-memory stores.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub stripe: StripeConfig,
    pub webhook_secret: String,
    pub checkout: CheckoutSettings,
    pub push_endpoint: String,
    /// `None` when `SMTP_HOST` is unset.
    pub email: Option<EmailConfig>,
}

impl AppConfig {
    /// | Env Var                 | Default                          |
    /// |-------------------------|----------------------------------|
    /// | `PORT`                  | `8083`                           |
    /// | `DATABASE_URL`          | unset (in-memory stores)         |
    /// | `NATS_URL`              | unset                            |
    /// | `STRIPE_SECRET_KEY`     | required                         |
    /// | `STRIPE_WEBHOOK_SECRET` | required                         |
    /// | `STRIPE_API_BASE`       | `https://api.stripe.com`         |
    /// | `PUBLIC_BASE_URL`       | `http://localhost:3000`          |
    /// | `SHIPPING_COUNTRIES`    | `HU`                             |
    /// | `PROMO_CODE`            | unset                            |
    /// | `PROMO_COUPON_ID`       | required if `PROMO_CODE` is set  |
    /// | `ORDER_NUMBER_PREFIX`   | `ORD`                            |
    /// | `GATEWAY_TIMEOUT_SECS`  | `15`                             |
    /// | `PUSH_ENDPOINT`         | Expo push API                    |
    /// | `SMTP_*`                | see [`EmailConfig::from_lookup`] |
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match get("PORT") {
            Some(p) => p.parse().context("PORT must be a valid u16")?,
            None => 8083,
        };
        let gateway_timeout = match get("GATEWAY_TIMEOUT_SECS") {
            Some(s) => Duration::from_secs(s.parse().context("GATEWAY_TIMEOUT_SECS must be a whole number of seconds")?),
            None => crate::payment::stripe::DEFAULT_TIMEOUT,
        };

        let promo = match (get("PROMO_CODE"), get("PROMO_COUPON_ID")) {
            (Some(code), Some(coupon_id)) => Some(PromoCode { code, coupon_id }),
            (Some(_), None) => bail!("PROMO_COUPON_ID must be set together with PROMO_CODE"),
            _ => None,
        };

        let allowed_countries: Vec<String> = get("SHIPPING_COUNTRIES")
            .unwrap_or_else(|| "HU".into())
            .split(',')
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect();

        Ok(Self {
            port,
            database_url: get("DATABASE_URL"),
            nats_url: get("NATS_URL"),
            stripe: StripeConfig {
                secret_key: get("STRIPE_SECRET_KEY").context("STRIPE_SECRET_KEY is required")?,
                api_base: get("STRIPE_API_BASE").unwrap_or_else(|| "https://api.stripe.com".into()),
                timeout: gateway_timeout,
            },
            webhook_secret: get("STRIPE_WEBHOOK_SECRET").context("STRIPE_WEBHOOK_SECRET is required")?,
            checkout: CheckoutSettings {
                public_base_url: get("PUBLIC_BASE_URL").unwrap_or_else(|| "http://localhost:3000".into()),
                allowed_countries,
                promo,
                order_number_prefix: get("ORDER_NUMBER_PREFIX").unwrap_or_else(|| "ORD".into()),
                gateway_timeout,
            },
            push_endpoint: get("PUSH_ENDPOINT").unwrap_or_else(|| DEFAULT_PUSH_ENDPOINT.into()),
            email: EmailConfig::from_lookup(&get),
        })
    }
}
