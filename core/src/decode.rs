//! Turning raw response bytes into the caller's declared type.
//!
//! The engine never inspects decoder errors; whatever `Decodable::decode`
//! returns is surfaced as `HttpError::Decode` unchanged.

use std::ops::{Deref, DerefMut};

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::BoxError;

/// Options passed untouched from the request to the decoder and body encoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Replace invalid UTF-8 with U+FFFD instead of failing `String` decodes.
    pub lossy_utf8: bool,
    /// Decode an empty body as JSON `null`.
    pub empty_as_null: bool,
    /// Pretty-print JSON request bodies.
    pub pretty_json: bool,
}

/// A type a response body can be decoded into.
pub trait Decodable: Sized + Send + 'static {
    fn decode(body: &[u8], options: &DecodeOptions) -> Result<Self, BoxError>;
}

impl Decodable for () {
    fn decode(_body: &[u8], _options: &DecodeOptions) -> Result<Self, BoxError> {
        Ok(())
    }
}

impl Decodable for Bytes {
    fn decode(body: &[u8], _options: &DecodeOptions) -> Result<Self, BoxError> {
        Ok(Bytes::copy_from_slice(body))
    }
}

impl Decodable for Vec<u8> {
    fn decode(body: &[u8], _options: &DecodeOptions) -> Result<Self, BoxError> {
        Ok(body.to_vec())
    }
}

impl Decodable for String {
    fn decode(body: &[u8], options: &DecodeOptions) -> Result<Self, BoxError> {
        if options.lossy_utf8 {
            return Ok(String::from_utf8_lossy(body).into_owned());
        }
        Ok(std::str::from_utf8(body)?.to_string())
    }
}

impl Decodable for serde_json::Value {
    fn decode(body: &[u8], options: &DecodeOptions) -> Result<Self, BoxError> {
        Ok(json_from_slice(body, options)?)
    }
}

/// JSON body decoded with serde.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> Decodable for Json<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn decode(body: &[u8], options: &DecodeOptions) -> Result<Self, BoxError> {
        Ok(Json(json_from_slice(body, options)?))
    }
}

fn json_from_slice<T: DeserializeOwned>(
    body: &[u8],
    options: &DecodeOptions,
) -> Result<T, serde_json::Error> {
    if body.is_empty() && options.empty_as_null {
        return serde_json::from_slice(b"null");
    }
    serde_json::from_slice(body)
}
