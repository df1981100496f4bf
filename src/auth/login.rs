//! Login request model for user and school accounts.

// self
use crate::{_prelude::*, auth::secret::TokenSecret};

/// Account family the login targets; schools authenticate against their own endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
	/// Student or teacher account.
	#[default]
	User,
	/// School account.
	School,
}
impl AccountKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AccountKind::User => "user",
			AccountKind::School => "school",
		}
	}
}
impl Display for AccountKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Email/password pair submitted to the login endpoint.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
	/// Account email address.
	pub email: String,
	/// Account password; redacted in `Debug`.
	pub password: TokenSecret,
	/// Which login endpoint to use.
	#[serde(skip)]
	pub account: AccountKind,
}
impl LoginRequest {
	/// Creates a user-account login request.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			email: email.into(),
			password: TokenSecret::new(password),
			account: AccountKind::User,
		}
	}

	/// Creates a school-account login request.
	pub fn school(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self::new(email, password).with_account(AccountKind::School)
	}

	/// Overrides the account kind.
	pub fn with_account(mut self, account: AccountKind) -> Self {
		self.account = account;

		self
	}
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest")
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.field("account", &self.account)
			.finish()
	}
}
