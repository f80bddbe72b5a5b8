//! Income verification from bank statement text.
//!
//! Salary credits are recognized by their narration (`SALARY`, `SAL`,
//! `SAL-TRANSFER`, `SALARY CREDIT`) followed on the same line by an amount
//! with two decimals, e.g. `SAL-TRANSFER ACME LTD 42,500.00`. Extracting text
//! from the statement document happens upstream.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

static SALARY_CREDIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:SALARY|SAL|SAL-TRANSFER|SALARY CREDIT)\s.*?([\d,]+\.\d{2})")
        .expect("salary credit pattern is valid")
});

/// Outcome of scanning a statement for salary credits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IncomeVerification {
    Verified {
        /// Mean of all salary credits found
        average_income: f64,
        salary_credits: usize,
    },
    NoSalaryCredits,
}

impl IncomeVerification {
    /// Verified income, when at least one salary credit was found.
    pub fn verified_income(&self) -> Option<f64> {
        match self {
            Self::Verified { average_income, .. } => Some(*average_income),
            Self::NoSalaryCredits => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Verified { average_income, .. } => format!(
                "Verified: Average monthly income is ₹{}",
                format_amount(*average_income)
            ),
            Self::NoSalaryCredits => "Analyzed: No salary credits found.".to_string(),
        }
    }
}

/// Amounts of every salary credit in `text`, in statement order.
pub fn salary_credits(text: &str) -> Vec<f64> {
    SALARY_CREDIT
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|amount| amount.as_str().replace(',', "").parse::<f64>().ok())
        .collect()
}

/// Scan statement text (one or more pages) and average the salary credits.
pub fn verify_income<'a, I>(pages: I) -> IncomeVerification
where
    I: IntoIterator<Item = &'a str>,
{
    let credits: Vec<f64> = pages.into_iter().flat_map(salary_credits).collect();

    if credits.is_empty() {
        debug!("No salary credits found in statement");
        return IncomeVerification::NoSalaryCredits;
    }

    let average_income = credits.iter().sum::<f64>() / credits.len() as f64;
    debug!(
        salary_credits = credits.len(),
        average_income = average_income,
        "Statement income verified"
    );

    IncomeVerification::Verified {
        average_income,
        salary_credits: credits.len(),
    }
}

/// Two decimals with thousands separators: `42500.5` -> `42,500.50`.
fn format_amount(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((&fixed, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, fraction)
}
