//! Text form of tokens: URL-safe base64.
//!
//! Raw tokens always start with [`TOKEN_VERSION`] (0x01), which is outside the
//! base64 alphabet, so an upload can be classified without any extra marker.

use std::borrow::Cow;

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};

use super::cipher::{CipherError, TOKEN_VERSION};

/// URL-safe alphabet, no padding on encode, padding optional on decode.
const ARMOR: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode a raw token as armored text.
pub fn armor(token: &[u8]) -> String {
    ARMOR.encode(token)
}

/// Return the raw token contained in an upload, decoding it if it is armored.
///
/// # Errors
///
/// Returns [`CipherError::MalformedToken`] if the upload is neither a raw token
/// nor valid base64.
pub fn unarmor(upload: &[u8]) -> Result<Cow<'_, [u8]>, CipherError> {
    if upload.first() == Some(&TOKEN_VERSION) {
        return Ok(Cow::Borrowed(upload));
    }
    ARMOR
        .decode(trim_ascii_whitespace(upload))
        .map(Cow::Owned)
        .map_err(|_| CipherError::MalformedToken)
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
