//! Reqwest wrapper that authorizes outgoing API requests through a [`TokenCoordinator`].
//!
//! Each request is built by a caller-supplied closure so it can be rebuilt for the single retry
//! that follows a `401` response.

// crates.io
use reqwest::{RequestBuilder, Response, header::AUTHORIZATION};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	coordinator::TokenCoordinator,
	error::TransportError,
	http::{ReqwestTransport, SessionTransport},
	obs::{self, OpOutcome, OpSpan, SessionOp},
};

/// HTTP client that attaches the current bearer token and retries once after a refresh.
pub struct AuthorizedClient<T>
where
	T: ?Sized + SessionTransport,
{
	client: ReqwestClient,
	coordinator: TokenCoordinator<T>,
}
impl<T> AuthorizedClient<T>
where
	T: ?Sized + SessionTransport,
{
	/// Wraps `client` so its requests are authorized by `coordinator`.
	pub fn new(client: ReqwestClient, coordinator: TokenCoordinator<T>) -> Self {
		Self { client, coordinator }
	}

	/// Returns the coordinator backing this client.
	pub fn coordinator(&self) -> &TokenCoordinator<T> {
		&self.coordinator
	}

	/// Sends the request produced by `build` with the current access token.
	///
	/// A `401` answer triggers [`TokenCoordinator::refresh`] and exactly one retry with the new
	/// token; the retry's response is returned whatever its status. A failed refresh surfaces
	/// as [`Error::Refresh`].
	pub async fn send<F>(&self, build: F) -> Result<Response>
	where
		F: Fn(&ReqwestClient) -> RequestBuilder,
	{
		const OP: SessionOp = SessionOp::Request;

		let span = OpSpan::new(OP, "send");

		obs::record_op_outcome(OP, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let token = self.coordinator.get_valid_token().await;
				let response = Self::authorize(build(&self.client), token.as_ref())
					.send()
					.await
					.map_err(TransportError::from)?;

				if response.status() != StatusCode::UNAUTHORIZED {
					return Ok(response);
				}

				let token = self.coordinator.refresh().await?;
				let retried = Self::authorize(build(&self.client), Some(&token))
					.send()
					.await
					.map_err(TransportError::from)?;

				Ok::<_, Error>(retried)
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(OP, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(OP, OpOutcome::Failure),
		}

		result
	}

	fn authorize(request: RequestBuilder, token: Option<&TokenSecret>) -> RequestBuilder {
		match token {
			Some(token) => request.header(AUTHORIZATION, token.bearer()),
			None => request,
		}
	}
}
impl AuthorizedClient<ReqwestTransport> {
	/// Reuses the transport's reqwest client for API requests.
	pub fn from_coordinator(coordinator: TokenCoordinator<ReqwestTransport>) -> Self {
		let client = coordinator.transport.client().clone();

		Self::new(client, coordinator)
	}
}
impl<T> Debug for AuthorizedClient<T>
where
	T: ?Sized + SessionTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizedClient").field("coordinator", &self.coordinator).finish()
	}
}
