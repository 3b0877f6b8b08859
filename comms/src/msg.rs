//! Envelopes exchanged with the coordinating server during the "get model" phase.
//!
//! The envelopes are protocol buffer messages, so fields are tagged and may arrive in any
//! order. `retcode` is declared as an explicitly present field: a response without it is
//! distinguishable from one carrying `0`.

use std::io;

use prost::Message;

use crate::{Deserialize, Serialize};

/// Request sent by a participant to fetch the current global model.
#[derive(Clone, PartialEq, Message)]
pub struct RequestGetModel {
    #[prost(string, tag = "1")]
    pub fl_name: String,
    #[prost(int32, tag = "2")]
    pub iteration: i32,
    /// Epoch milliseconds, as a decimal string.
    #[prost(string, tag = "3")]
    pub timestamp: String,
}

/// A single named weight block.
#[derive(Clone, PartialEq, Message)]
pub struct FeatureMap {
    #[prost(string, tag = "1")]
    pub weight_fullname: String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

/// The server's reply to a `RequestGetModel`.
#[derive(Clone, PartialEq, Message)]
pub struct ResponseGetModel {
    #[prost(int32, optional, tag = "1")]
    pub retcode: Option<i32>,
    #[prost(string, tag = "2")]
    pub reason: String,
    #[prost(int32, tag = "3")]
    pub iteration: i32,
    /// Epoch milliseconds, as a decimal string.
    #[prost(string, tag = "4")]
    pub timestamp: String,
    #[prost(message, repeated, tag = "5")]
    pub feature_map: Vec<FeatureMap>,
}

/// Numeric return codes used by the coordinating server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResponseCode {
    Succeed = 200,
    SucNotReady = 201,
    RepeatRequest = 202,
    SucNotMatch = 204,
    OutOfTime = 300,
    NotSelected = 301,
    RequestError = 400,
    SystemError = 500,
}

impl ResponseCode {
    /// The wire value of this code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Looks up the code for a wire value.
    ///
    /// # Returns
    /// `None` if the value is not part of the server's table.
    pub fn from_code(code: i32) -> Option<Self> {
        let code = match code {
            200 => Self::Succeed,
            201 => Self::SucNotReady,
            202 => Self::RepeatRequest,
            204 => Self::SucNotMatch,
            300 => Self::OutOfTime,
            301 => Self::NotSelected,
            400 => Self::RequestError,
            500 => Self::SystemError,
            _ => return None,
        };

        Some(code)
    }
}

/// An already encoded envelope, written and read without copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Raw<'a>(pub &'a [u8]);

impl<'a> Serialize<'a> for Raw<'a> {
    fn serialize(&'a self, _buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        Some(self.0)
    }
}

impl<'a> Deserialize<'a> for Raw<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        Ok(Self(buf))
    }
}

fn decode<M: Message + Default>(buf: &[u8]) -> io::Result<M> {
    M::decode(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

impl<'a> Serialize<'a> for RequestGetModel {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        buf.extend_from_slice(&self.encode_to_vec());
        None
    }
}

impl Deserialize<'_> for RequestGetModel {
    fn deserialize(buf: &[u8]) -> io::Result<Self> {
        decode(buf)
    }
}

impl<'a> Serialize<'a> for ResponseGetModel {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        buf.extend_from_slice(&self.encode_to_vec());
        None
    }
}

impl Deserialize<'_> for ResponseGetModel {
    fn deserialize(buf: &[u8]) -> io::Result<Self> {
        decode(buf)
    }
}
