//! # SOS Operator Tools
//!
//! Small helpers behind the `sos-cli` binary, for checking a deployment by hand:
//! - `normalize` prints what each raw number turns into, or why it is rejected
//! - `send-test` pushes the fixed test SMS through Twilio to one number
use anyhow::{Context, Result};
use sos_core::{
    NormalizedAddress, PhoneError, PhoneNormalizer,
    channel::{TwilioConfig, TwilioChannel},
};

pub fn normalizer(country_code: &str) -> Result<PhoneNormalizer> {
    PhoneNormalizer::new(country_code)
        .with_context(|| format!("Bad country code {country_code:?}"))
}

pub fn normalize_all<'a>(
    normalizer: &PhoneNormalizer,
    phones: &'a [String],
) -> Vec<(&'a str, Result<NormalizedAddress, PhoneError>)> {
    phones
        .iter()
        .map(|phone| (phone.as_str(), normalizer.normalize(phone)))
        .collect()
}

/// One line per input, tab separated, in input order.
pub fn report(results: &[(&str, Result<NormalizedAddress, PhoneError>)]) -> String {
    results
        .iter()
        .map(|(raw, result)| match result {
            Ok(address) => format!("{raw}\t{address}"),
            Err(e) => format!("{raw}\tERROR: {e}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn twilio_channel(
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
) -> Result<TwilioChannel> {
    let config = TwilioConfig {
        account_sid: account_sid.context("TWILIO_SID is not set")?,
        auth_token: auth_token.context("TWILIO_AUTH is not set")?,
        from_number: from_number.context("TWILIO_NUMBER is not set")?,
    };

    Ok(TwilioChannel::new(config))
}
