pub mod jwt;
pub mod locale;
pub mod response;
pub mod sentry;
pub mod text;
