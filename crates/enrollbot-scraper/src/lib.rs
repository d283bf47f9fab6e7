//! # EnrollBot Scraper
//!
//! Reads the status of an enrollment request from the public status page.
//! The page is an ASP.NET form: a GET yields an anti-forgery token (and its
//! cookie), a POST with token + request number + PIN yields the result,
//! rendered inside the validation summary block.

pub mod enroll;

pub use enroll::{EnrollScraper, parse_form_token, parse_result};
