//! Applicant record: the 31 typed attributes a scoring request carries.
//!
//! Categorical domains are declared in their natural enumeration order,
//! which is the alphabetical order indicator columns were generated in at
//! training time. The first value of each domain is the drop-first baseline.

use crate::error::{FieldViolation, ScoringError};
use serde::{Deserialize, Serialize};

/// A categorical attribute with a closed, ordered domain.
pub trait Categorical: Copy + 'static {
    /// Domain labels in natural enumeration order.
    const DOMAIN: &'static [&'static str];

    /// Wire label of this value.
    fn label(&self) -> &'static str;
}

macro_rules! categorical {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $label:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label $(, alias = $alias)*)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];
        }

        impl Categorical for $name {
            const DOMAIN: &'static [&'static str] = &[$($label),+];

            fn label(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }
    };
}

categorical! {
    /// Highest education level attained
    Education {
        Bachelors => "Bachelor's",
        HighSchool => "High School",
        Masters => "Master's",
        NoFormal => "None",
        PhD => "PhD",
        Primary => "Primary",
    }
}

categorical! {
    EmploymentType {
        Contract => "Contract",
        FullTime => "Full-time",
        PartTime => "Part-time",
        SelfEmployed => "Self-employed",
        Unemployed => "Unemployed",
    }
}

categorical! {
    MaritalStatus {
        Divorced => "Divorced",
        Married => "Married",
        Single => "Single",
        Widowed => "Widowed",
    }
}

categorical! {
    LoanPurpose {
        Auto => "Auto",
        Business => "Business",
        DebtConsolidation => "Debt Consolidation",
        Education => "Education",
        Home => "Home",
        HomeImprovement => "Home Improvement",
        Other => "Other",
        Personal => "Personal",
    }
}

categorical! {
    /// Binary flag shared by the mortgage, dependents, co-signer and land fields
    YesNo {
        No => "No",
        Yes => "Yes",
    }
}

categorical! {
    Sector {
        Rural => "Rural",
        Urban => "Urban",
    }
}

categorical! {
    /// Social group of the household head
    SocialGroup {
        General => "General",
        Obc => "OBC",
        Other => "Other",
        Sc => "SC",
        St => "ST",
    }
}

categorical! {
    /// Primary income activity of the household
    IncomeActivity {
        Business => "Business",
        FarmOwner => "Farm Owner",
        Salaried => "Salaried",
        SelfEmployed => "Self-employed" | "Self-Employed",
    }
}

categorical! {
    DwellingType {
        Ancestral => "Ancestral",
        HiredRented => "Hired/Rented" | "Hired",
        Owned => "Owned",
    }
}

categorical! {
    RationCardType {
        Apl => "APL",
        Antyodaya => "Antyodaya",
        Bpl => "BPL",
        Priority => "Priority",
    }
}

categorical! {
    Religion {
        Christian => "Christian",
        Hindu => "Hindu",
        Muslim => "Muslim",
        Other => "Other",
    }
}

/// Declared type of a record field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Numeric field with an inclusive range.
    Numeric { min: f64, max: f64 },
    /// Categorical field with an enumerated domain.
    Categorical(&'static [&'static str]),
}

/// Name and declared type of one of the 31 record fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn numeric(name: &'static str, min: f64, max: f64) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Numeric { min, max },
    }
}

const fn categorical(name: &'static str, domain: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Categorical(domain),
    }
}

/// Number of attributes in an applicant record.
pub const FIELD_COUNT: usize = 31;

/// Declared fields, in the order `ApplicantRecord::attributes` yields them.
pub const FIELD_SPECS: [FieldSpec; FIELD_COUNT] = [
    // Repayment model inputs
    numeric("Age", 18.0, 100.0),
    numeric("Income", 0.0, 10_000_000.0),
    numeric("LoanAmount", 10_000.0, 1_000_000.0),
    numeric("CreditScore", 0.0, 900.0),
    numeric("MonthsEmployed", 0.0, 600.0),
    numeric("NumCreditLines", 0.0, 20.0),
    numeric("InterestRate", 0.0, 30.0),
    numeric("LoanTerm", 6.0, 120.0),
    numeric("DTIRatio", 0.0, 1.0),
    categorical("Education", Education::DOMAIN),
    categorical("EmploymentType", EmploymentType::DOMAIN),
    categorical("MaritalStatus", MaritalStatus::DOMAIN),
    categorical("HasMortgage", YesNo::DOMAIN),
    categorical("HasDependents", YesNo::DOMAIN),
    categorical("LoanPurpose", LoanPurpose::DOMAIN),
    categorical("HasCoSigner", YesNo::DOMAIN),
    // Income proxy model inputs
    categorical("Sector", Sector::DOMAIN),
    categorical("Social_Group_of_HH_Head", SocialGroup::DOMAIN),
    categorical("Max_Income_Activity", IncomeActivity::DOMAIN),
    categorical("Type_of_Dwelling_Unit", DwellingType::DOMAIN),
    categorical("Land_Ownership", YesNo::DOMAIN),
    categorical("Ration_Card_Type", RationCardType::DOMAIN),
    categorical("Religion_of_HH_Head", Religion::DOMAIN),
    numeric("head_of_household_age", 18.0, 100.0),
    numeric("household_size_calculated", 1.0, 20.0),
    numeric("avg_education_years_adults", 0.0, 25.0),
    numeric("num_internet_users", 0.0, 10.0),
    numeric("fuel_expenditure", 0.0, 5_000.0),
    numeric("comm_expenditure", 0.0, 3_000.0),
    numeric("Asset_Score_X1", 0.0, 24.0),
    numeric("Scheme_Index_X2", 0.0, 5.0),
];

/// Categorical fields one-hot encoded for the repayment model.
pub const REPAYMENT_CATEGORICAL_FIELDS: [&str; 7] = [
    "Education",
    "EmploymentType",
    "MaritalStatus",
    "HasMortgage",
    "HasDependents",
    "LoanPurpose",
    "HasCoSigner",
];

/// Categorical fields one-hot encoded for the income model.
pub const INCOME_CATEGORICAL_FIELDS: [&str; 7] = [
    "Sector",
    "Social_Group_of_HH_Head",
    "Max_Income_Activity",
    "Type_of_Dwelling_Unit",
    "Land_Ownership",
    "Ration_Card_Type",
    "Religion_of_HH_Head",
];

/// Value of a single attribute, ready for encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue {
    Numeric(f64),
    Categorical {
        label: &'static str,
        domain: &'static [&'static str],
    },
}

/// One named attribute of a record; `None` when the request omitted it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attribute {
    pub name: &'static str,
    pub value: Option<AttributeValue>,
}

/// How absent fields are treated at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// Absent fields encode as zero (no indicator set, numeric 0.0).
    #[default]
    ZeroFill,
    /// Absent fields reject the record.
    Reject,
}

/// Immutable applicant record supplied per scoring request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicantRecord {
    #[serde(rename = "Age")]
    pub age: Option<u32>,
    #[serde(rename = "Income")]
    pub income: Option<f64>,
    #[serde(rename = "LoanAmount")]
    pub loan_amount: Option<f64>,
    #[serde(rename = "CreditScore")]
    pub credit_score: Option<u32>,
    #[serde(rename = "MonthsEmployed")]
    pub months_employed: Option<u32>,
    #[serde(rename = "NumCreditLines")]
    pub num_credit_lines: Option<u32>,
    #[serde(rename = "InterestRate")]
    pub interest_rate: Option<f64>,
    #[serde(rename = "LoanTerm")]
    pub loan_term: Option<u32>,
    #[serde(rename = "DTIRatio")]
    pub dti_ratio: Option<f64>,

    #[serde(rename = "Education")]
    pub education: Option<Education>,
    #[serde(rename = "EmploymentType")]
    pub employment_type: Option<EmploymentType>,
    #[serde(rename = "MaritalStatus")]
    pub marital_status: Option<MaritalStatus>,
    #[serde(rename = "HasMortgage")]
    pub has_mortgage: Option<YesNo>,
    #[serde(rename = "HasDependents")]
    pub has_dependents: Option<YesNo>,
    #[serde(rename = "LoanPurpose")]
    pub loan_purpose: Option<LoanPurpose>,
    #[serde(rename = "HasCoSigner")]
    pub has_co_signer: Option<YesNo>,

    #[serde(rename = "Sector")]
    pub sector: Option<Sector>,
    #[serde(rename = "Social_Group_of_HH_Head")]
    pub social_group: Option<SocialGroup>,
    #[serde(rename = "Max_Income_Activity")]
    pub income_activity: Option<IncomeActivity>,
    #[serde(rename = "Type_of_Dwelling_Unit")]
    pub dwelling_type: Option<DwellingType>,
    #[serde(rename = "Land_Ownership")]
    pub land_ownership: Option<YesNo>,
    #[serde(rename = "Ration_Card_Type")]
    pub ration_card_type: Option<RationCardType>,
    #[serde(rename = "Religion_of_HH_Head")]
    pub religion: Option<Religion>,

    pub head_of_household_age: Option<u32>,
    pub household_size_calculated: Option<u32>,
    pub avg_education_years_adults: Option<f64>,
    pub num_internet_users: Option<u32>,
    /// Average monthly electricity/fuel spend
    pub fuel_expenditure: Option<f64>,
    /// Average monthly mobile/communication spend
    pub comm_expenditure: Option<f64>,
    /// Composite possessions score (0-24)
    #[serde(rename = "Asset_Score_X1")]
    pub asset_score: Option<f64>,
    /// Composite reliance-on-schemes score (0-5)
    #[serde(rename = "Scheme_Index_X2")]
    pub scheme_index: Option<f64>,
}

fn num<T: Into<f64>>(value: Option<T>) -> Option<AttributeValue> {
    value.map(|v| AttributeValue::Numeric(v.into()))
}

fn cat<C: Categorical>(value: Option<C>) -> Option<AttributeValue> {
    value.map(|v| AttributeValue::Categorical {
        label: v.label(),
        domain: C::DOMAIN,
    })
}

impl ApplicantRecord {
    /// Reference applicant used in the API documentation.
    pub fn example() -> Self {
        Self {
            age: Some(45),
            income: Some(500_000.0),
            loan_amount: Some(100_000.0),
            credit_score: Some(750),
            months_employed: Some(120),
            num_credit_lines: Some(5),
            interest_rate: Some(12.5),
            loan_term: Some(60),
            dti_ratio: Some(0.3),
            education: Some(Education::Bachelors),
            employment_type: Some(EmploymentType::FullTime),
            marital_status: Some(MaritalStatus::Married),
            has_mortgage: Some(YesNo::Yes),
            has_dependents: Some(YesNo::Yes),
            loan_purpose: Some(LoanPurpose::DebtConsolidation),
            has_co_signer: Some(YesNo::No),
            sector: Some(Sector::Rural),
            social_group: Some(SocialGroup::Obc),
            income_activity: Some(IncomeActivity::SelfEmployed),
            dwelling_type: Some(DwellingType::Owned),
            land_ownership: Some(YesNo::Yes),
            ration_card_type: Some(RationCardType::Priority),
            religion: Some(Religion::Hindu),
            head_of_household_age: Some(40),
            household_size_calculated: Some(5),
            avg_education_years_adults: Some(8.5),
            num_internet_users: Some(1),
            fuel_expenditure: Some(1_250.0),
            comm_expenditure: Some(450.0),
            asset_score: Some(7.0),
            scheme_index: Some(2.15),
        }
    }

    /// Copy of this record with the income field replaced, e.g. by a
    /// figure verified from a bank statement.
    pub fn with_income(&self, income: f64) -> Self {
        Self {
            income: Some(income),
            ..self.clone()
        }
    }

    /// All 31 attributes, in `FIELD_SPECS` order.
    pub fn attributes(&self) -> [Attribute; FIELD_COUNT] {
        let values = [
            num(self.age),
            num(self.income),
            num(self.loan_amount),
            num(self.credit_score),
            num(self.months_employed),
            num(self.num_credit_lines),
            num(self.interest_rate),
            num(self.loan_term),
            num(self.dti_ratio),
            cat(self.education),
            cat(self.employment_type),
            cat(self.marital_status),
            cat(self.has_mortgage),
            cat(self.has_dependents),
            cat(self.loan_purpose),
            cat(self.has_co_signer),
            cat(self.sector),
            cat(self.social_group),
            cat(self.income_activity),
            cat(self.dwelling_type),
            cat(self.land_ownership),
            cat(self.ration_card_type),
            cat(self.religion),
            num(self.head_of_household_age),
            num(self.household_size_calculated),
            num(self.avg_education_years_adults),
            num(self.num_internet_users),
            num(self.fuel_expenditure),
            num(self.comm_expenditure),
            num(self.asset_score),
            num(self.scheme_index),
        ];

        let mut index = 0;
        values.map(|value| {
            let name = FIELD_SPECS[index].name;
            index += 1;
            Attribute { name, value }
        })
    }

    /// Names of the fields the request omitted.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.attributes()
            .iter()
            .filter(|a| a.value.is_none())
            .map(|a| a.name)
            .collect()
    }

    /// Boundary validation.
    ///
    /// Present numeric values must be finite and inside the declared range.
    /// Absent fields are accepted under `ZeroFill` and rejected under `Reject`.
    pub fn validate(&self, policy: MissingFieldPolicy) -> Result<(), ScoringError> {
        let mut violations = Vec::new();

        for (attribute, spec) in self.attributes().iter().zip(FIELD_SPECS.iter()) {
            match (attribute.value, spec.kind) {
                (None, _) => {
                    if policy == MissingFieldPolicy::Reject {
                        violations.push(FieldViolation::new(spec.name, "field is required"));
                    }
                }
                (Some(AttributeValue::Numeric(v)), FieldKind::Numeric { min, max }) => {
                    if !v.is_finite() {
                        violations.push(FieldViolation::new(spec.name, "value is not finite"));
                    } else if v < min || v > max {
                        violations.push(FieldViolation::new(
                            spec.name,
                            format!("{} outside [{}, {}]", v, min, max),
                        ));
                    }
                }
                (Some(AttributeValue::Categorical { label, .. }), FieldKind::Categorical(domain)) => {
                    if !domain.contains(&label) {
                        violations.push(FieldViolation::new(
                            spec.name,
                            format!("'{}' is not in the declared domain", label),
                        ));
                    }
                }
                _ => violations.push(FieldViolation::new(spec.name, "value has the wrong type")),
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ScoringError::InvalidRecord { violations })
        }
    }
}
