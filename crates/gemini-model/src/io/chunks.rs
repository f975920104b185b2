#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

/// The body stream broke off before it was finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error(pub String);

/// A source of body byte chunks.
pub enum Chunks {
    Response(Response),
    #[cfg(test)]
    Scripted(VecDeque<Result<Bytes, Error>>),
}

impl Chunks {
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    #[cfg(test)]
    pub fn from_static(parts: &[&'static [u8]]) -> Self {
        Chunks::Scripted(
            parts.iter().map(|part| Ok(Bytes::from_static(part))).collect(),
        )
    }

    #[cfg(test)]
    pub fn from_results(results: Vec<Result<Bytes, Error>>) -> Self {
        Chunks::Scripted(results.into())
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => response
                .chunk()
                .await
                .map_err(|err| Error(format!("{err}"))),
            #[cfg(test)]
            Chunks::Scripted(parts) => parts.pop_front().transpose(),
        }
    }
}
