//! Payer identity validation: CPF checksum, e-mail shape and phone length.
//!
//! All functions are pure and never touch the network or the store.

use regex::Regex;
use std::sync::OnceLock;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
    })
}

/// Keep only ASCII digits.
pub fn digits_only(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Compute one CPF check digit from the leading digits.
///
/// Weights run from `digits.len() + 1` down to 2.
pub fn cpf_check_digit(digits: &[u32]) -> u32 {
    let top = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (top - i as u32))
        .sum();
    let digit = 11 - (sum % 11);
    if digit >= 10 {
        0
    } else {
        digit
    }
}

/// Validate a Brazilian CPF, ignoring punctuation.
pub fn validate_cpf(input: &str) -> bool {
    let cpf = digits_only(input);
    if cpf.len() != 11 {
        return false;
    }

    let digits: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    let first = cpf_check_digit(&digits[..9]);
    if first != digits[9] {
        return false;
    }
    cpf_check_digit(&digits[..10]) == digits[10]
}

pub fn validate_email(input: &str) -> bool {
    email_regex().is_match(input)
}

/// Brazilian landline (10) or mobile (11) number including area code.
pub fn validate_phone(input: &str) -> bool {
    let len = digits_only(input).len();
    (10..=11).contains(&len)
}

/// Split a phone into `(area, number)`; the area code is the first two digits.
pub fn split_phone(input: &str) -> (String, String) {
    let digits = digits_only(input);
    if digits.len() <= 2 {
        return (digits, String::new());
    }
    let (area, number) = digits.split_at(2);
    (area.to_string(), number.to_string())
}
