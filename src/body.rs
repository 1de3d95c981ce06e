//! Request body wrapper counting the bytes read by the inner service.
//!
//! The running total is not exposed through [`LengthBody`] itself: services further down the
//! stack are free to replace the request body with their own wrapper, so the total lives in a
//! [`BodyLength`] cell shared through the request [`Extensions`].

use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{ready, Context, Poll},
};

use bytes::Buf;
use http::{Extensions, Request};
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use pin_project::pin_project;

/// Number of body bytes read so far, shared by every clone.
#[derive(Clone, Debug, Default)]
pub struct BodyLength(Arc<AtomicU64>);

impl BodyLength {
    /// Current number of bytes.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn add(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Returns the cell installed by [`track`], if any.
    pub fn from_extensions(extensions: &Extensions) -> Option<&BodyLength> {
        extensions.get::<BodyLength>()
    }
}

/// Wraps the body of `request` in a [`LengthBody`].
///
/// A new, zeroed [`BodyLength`] is inserted in the request extensions and returned as well.
pub fn track<B>(request: Request<B>) -> (Request<LengthBody<B>>, BodyLength) {
    let (mut parts, body) = request.into_parts();
    let length = BodyLength::default();
    parts.extensions.insert(length.clone());
    let body = LengthBody::new(body, length.clone());
    (Request::from_parts(parts, body), length)
}

/// [`Body`] adding the size of every data frame to a [`BodyLength`].
#[pin_project]
#[derive(Debug)]
pub struct LengthBody<B> {
    #[pin]
    inner: B,
    length: BodyLength,
}

impl<B> LengthBody<B> {
    pub fn new(inner: B, length: BodyLength) -> Self {
        Self { inner, length }
    }

    /// The cell updated by this body.
    pub fn length(&self) -> &BodyLength {
        &self.length
    }
}

impl<B: Body> LengthBody<B> {
    /// Reads and discards the rest of the body.
    ///
    /// Once it returns `Ok`, the [`BodyLength`] holds the full size of the body, even if it was
    /// only partially read before. The first error produced by the inner body is returned.
    pub async fn close(self) -> Result<(), B::Error> {
        let mut body = std::pin::pin!(self);
        while let Some(frame) = body.frame().await {
            frame?;
        }
        Ok(())
    }
}

impl<B: Body> Body for LengthBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let frame = ready!(this.inner.poll_frame(cx));

        if let Some(Ok(frame)) = &frame {
            if let Some(data) = frame.data_ref() {
                this.length.add(data.remaining() as u64);
            }
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
