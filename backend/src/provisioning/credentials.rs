//! Control-plane credentials for new hosting accounts.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{AppError, Result};

/// Longest username the control plane accepts.
pub const MAX_USERNAME_LEN: usize = 16;

pub const PASSWORD_LEN: usize = 16;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*";

/// Normalise and check a domain name.
pub fn normalize_domain(domain: &str) -> Result<String> {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    let invalid = || AppError::Validation(format!("'{}' is not a valid domain", domain));

    if domain.is_empty() || domain.len() > 253 || !domain.contains('.') {
        return Err(invalid());
    }
    for label in domain.split('.') {
        if label.is_empty()
            || label.len() > 63
            || label.starts_with('-')
            || label.ends_with('-')
            || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(invalid());
        }
    }
    Ok(domain)
}

/// Derive the control-plane username from a domain.
///
/// Takes the first label, drops separators, lowercases and truncates:
/// `my-shop.com.br` becomes `myshop`.
pub fn derive_username(domain: &str) -> Result<String> {
    let domain = normalize_domain(domain)?;
    let first_label = domain.split('.').next().unwrap_or_default();
    let username: String = first_label
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_USERNAME_LEN)
        .collect();

    if username.is_empty() {
        return Err(AppError::Validation(format!(
            "cannot derive a username from '{}'",
            domain
        )));
    }
    Ok(username)
}

/// Random password with at least one character of each class.
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    let classes = [UPPER, LOWER, DIGITS, SYMBOLS];
    let all: Vec<u8> = classes.concat();

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    while chars.len() < PASSWORD_LEN {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    chars.into_iter().map(char::from).collect()
}
