//! The fixed field-key vocabulary and completeness validation

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Profile category a field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Company,
    Financial,
    Experience,
    Technical,
}

impl FieldCategory {
    /// Key of the nested profile section holding this category
    pub fn profile_section(self) -> &'static str {
        match self {
            FieldCategory::Company => "companyInfo",
            FieldCategory::Financial => "financialInfo",
            FieldCategory::Experience => "experienceInfo",
            FieldCategory::Technical => "technicalInfo",
        }
    }
}

/// Canonical identifier for one profile datum.
///
/// The variant order is the vocabulary order; `Ord` follows it, so maps keyed
/// by `FieldKey` iterate in the same order the profile schema lists fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKey {
    CompanyName,
    RegistrationNumber,
    ContactPerson,
    Phone,
    Email,
    Address,
    TaxId,
    Directors,
    Signature,
    AnnualTurnover,
    BankReference,
    CreditFacility,
    FinancialCapacity,
    BankGuarantee,
    Insurance,
    SimilarProjects,
    ProjectValue,
    CompletionDate,
    ClientReference,
    Equipment,
    Personnel,
    Methodology,
    Timeline,
}

impl FieldKey {
    /// The whole vocabulary, in schema order
    pub const ALL: [FieldKey; 23] = [
        FieldKey::CompanyName,
        FieldKey::RegistrationNumber,
        FieldKey::ContactPerson,
        FieldKey::Phone,
        FieldKey::Email,
        FieldKey::Address,
        FieldKey::TaxId,
        FieldKey::Directors,
        FieldKey::Signature,
        FieldKey::AnnualTurnover,
        FieldKey::BankReference,
        FieldKey::CreditFacility,
        FieldKey::FinancialCapacity,
        FieldKey::BankGuarantee,
        FieldKey::Insurance,
        FieldKey::SimilarProjects,
        FieldKey::ProjectValue,
        FieldKey::CompletionDate,
        FieldKey::ClientReference,
        FieldKey::Equipment,
        FieldKey::Personnel,
        FieldKey::Methodology,
        FieldKey::Timeline,
    ];

    /// Canonical snake_case wire name
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKey::CompanyName => "company_name",
            FieldKey::RegistrationNumber => "registration_number",
            FieldKey::ContactPerson => "contact_person",
            FieldKey::Phone => "phone",
            FieldKey::Email => "email",
            FieldKey::Address => "address",
            FieldKey::TaxId => "tax_id",
            FieldKey::Directors => "directors",
            FieldKey::Signature => "signature",
            FieldKey::AnnualTurnover => "annual_turnover",
            FieldKey::BankReference => "bank_reference",
            FieldKey::CreditFacility => "credit_facility",
            FieldKey::FinancialCapacity => "financial_capacity",
            FieldKey::BankGuarantee => "bank_guarantee",
            FieldKey::Insurance => "insurance",
            FieldKey::SimilarProjects => "similar_projects",
            FieldKey::ProjectValue => "project_value",
            FieldKey::CompletionDate => "completion_date",
            FieldKey::ClientReference => "client_reference",
            FieldKey::Equipment => "equipment",
            FieldKey::Personnel => "personnel",
            FieldKey::Methodology => "methodology",
            FieldKey::Timeline => "timeline",
        }
    }

    /// Name used by the profile schema (camelCase)
    pub fn profile_name(self) -> String {
        let mut out = String::new();
        let mut upper = false;
        for c in self.as_str().chars() {
            if c == '_' {
                upper = true;
            } else if upper {
                out.extend(c.to_uppercase());
                upper = false;
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Human-readable label as shown on the profile form
    pub fn label(self) -> &'static str {
        match self {
            FieldKey::CompanyName => "Company Name",
            FieldKey::RegistrationNumber => "Registration Number",
            FieldKey::ContactPerson => "Contact Person",
            FieldKey::Phone => "Phone Number",
            FieldKey::Email => "Email Address",
            FieldKey::Address => "Company Address",
            FieldKey::TaxId => "Tax ID Number",
            FieldKey::Directors => "Company Directors",
            FieldKey::Signature => "Authorized Signature",
            FieldKey::AnnualTurnover => "Annual Turnover",
            FieldKey::BankReference => "Bank Reference",
            FieldKey::CreditFacility => "Credit Facility",
            FieldKey::FinancialCapacity => "Financial Capacity",
            FieldKey::BankGuarantee => "Bank Guarantee",
            FieldKey::Insurance => "Insurance",
            FieldKey::SimilarProjects => "Similar Projects",
            FieldKey::ProjectValue => "Project Value",
            FieldKey::CompletionDate => "Completion Date",
            FieldKey::ClientReference => "Client Reference",
            FieldKey::Equipment => "Equipment",
            FieldKey::Personnel => "Personnel",
            FieldKey::Methodology => "Methodology",
            FieldKey::Timeline => "Timeline",
        }
    }

    pub fn category(self) -> FieldCategory {
        match self {
            FieldKey::CompanyName
            | FieldKey::RegistrationNumber
            | FieldKey::ContactPerson
            | FieldKey::Phone
            | FieldKey::Email
            | FieldKey::Address
            | FieldKey::TaxId
            | FieldKey::Directors
            | FieldKey::Signature => FieldCategory::Company,
            FieldKey::AnnualTurnover
            | FieldKey::BankReference
            | FieldKey::CreditFacility
            | FieldKey::FinancialCapacity
            | FieldKey::BankGuarantee
            | FieldKey::Insurance => FieldCategory::Financial,
            FieldKey::SimilarProjects
            | FieldKey::ProjectValue
            | FieldKey::CompletionDate
            | FieldKey::ClientReference => FieldCategory::Experience,
            FieldKey::Equipment
            | FieldKey::Personnel
            | FieldKey::Methodology
            | FieldKey::Timeline => FieldCategory::Technical,
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKey {
    type Err = Error;

    /// Accepts the snake_case wire name or the camelCase profile name
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        FieldKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == trimmed || k.profile_name() == trimmed)
            .ok_or_else(|| Error::UnknownFieldKey {
                key: trimmed.to_string(),
            })
    }
}

impl Serialize for FieldKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for FieldKey {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "FieldKey".into()
    }

    fn json_schema(_generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        let names: Vec<&str> = FieldKey::ALL.iter().map(|k| k.as_str()).collect();
        schemars::json_schema!({
            "type": "string",
            "enum": names,
        })
    }
}

/// Result of checking a value mapping against the vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct CompletenessReport {
    pub is_valid: bool,
    /// Missing keys in vocabulary order
    pub missing_fields: Vec<FieldKey>,
}

/// Check that every vocabulary key has a non-blank value.
///
/// Whitespace-only values count as missing.
pub fn validate_completeness(values: &BTreeMap<FieldKey, String>) -> CompletenessReport {
    let missing_fields: Vec<FieldKey> = FieldKey::ALL
        .iter()
        .copied()
        .filter(|key| values.get(key).map_or(true, |v| v.trim().is_empty()))
        .collect();

    CompletenessReport {
        is_valid: missing_fields.is_empty(),
        missing_fields,
    }
}

/// Flatten a profile into the `FieldKey -> value` mapping the engine consumes.
///
/// Accepts either a flat object (`{"company_name": ...}` or
/// `{"companyName": ...}`) or the nested profile shape with
/// `companyInfo`/`financialInfo`/`experienceInfo`/`technicalInfo` sections.
/// Unknown keys and non-string values are ignored; the returned list names
/// the keys that were dropped.
pub fn flatten_profile(
    profile: &serde_json::Value,
) -> Result<(BTreeMap<FieldKey, String>, Vec<String>)> {
    let obj = profile.as_object().ok_or_else(|| Error::InvalidProfile {
        reason: "expected a JSON object".to_string(),
    })?;

    let mut values = BTreeMap::new();
    let mut ignored = Vec::new();

    for (name, value) in obj {
        match value {
            serde_json::Value::Object(section) if is_profile_section(name) => {
                for (inner_name, inner_value) in section {
                    collect_entry(inner_name, inner_value, &mut values, &mut ignored);
                }
            }
            _ => collect_entry(name, value, &mut values, &mut ignored),
        }
    }

    Ok((values, ignored))
}

fn is_profile_section(name: &str) -> bool {
    [
        FieldCategory::Company,
        FieldCategory::Financial,
        FieldCategory::Experience,
        FieldCategory::Technical,
    ]
    .iter()
    .any(|c| c.profile_section() == name)
}

fn collect_entry(
    name: &str,
    value: &serde_json::Value,
    values: &mut BTreeMap<FieldKey, String>,
    ignored: &mut Vec<String>,
) {
    match (name.parse::<FieldKey>(), value.as_str()) {
        (Ok(key), Some(text)) => {
            values.insert(key, text.to_string());
        }
        (Ok(key), None) => ignored.push(key.to_string()),
        (Err(_), _) => ignored.push(name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn full_profile() -> BTreeMap<FieldKey, String> {
        FieldKey::ALL
            .iter()
            .map(|k| (*k, format!("value for {}", k)))
            .collect()
    }

    #[test]
    fn test_vocabulary_shape() {
        assert_eq!(FieldKey::ALL.len(), 23);
        let count = |c: FieldCategory| FieldKey::ALL.iter().filter(|k| k.category() == c).count();
        assert_eq!(count(FieldCategory::Company), 9);
        assert_eq!(count(FieldCategory::Financial), 6);
        assert_eq!(count(FieldCategory::Experience), 4);
        assert_eq!(count(FieldCategory::Technical), 4);
    }

    #[test]
    fn test_parse_both_spellings() {
        assert_eq!(
            "company_name".parse::<FieldKey>().unwrap(),
            FieldKey::CompanyName
        );
        assert_eq!(
            "companyName".parse::<FieldKey>().unwrap(),
            FieldKey::CompanyName
        );
        assert_eq!("taxId".parse::<FieldKey>().unwrap(), FieldKey::TaxId);
        assert!(matches!(
            "favourite_colour".parse::<FieldKey>(),
            Err(Error::UnknownFieldKey { .. })
        ));
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&FieldKey::AnnualTurnover).unwrap();
        assert_eq!(json, "\"annual_turnover\"");
        let key: FieldKey = serde_json::from_str("\"bankGuarantee\"").unwrap();
        assert_eq!(key, FieldKey::BankGuarantee);
    }

    #[test]
    fn test_validate_empty_mapping() {
        let report = validate_completeness(&BTreeMap::new());
        assert!(!report.is_valid);
        assert_eq!(report.missing_fields, FieldKey::ALL.to_vec());
    }

    #[test]
    fn test_validate_full_mapping() {
        let report = validate_completeness(&full_profile());
        assert!(report.is_valid);
        assert!(report.missing_fields.is_empty());
    }

    #[test]
    fn test_validate_whitespace_counts_as_missing() {
        let mut values = full_profile();
        values.insert(FieldKey::Email, "   ".to_string());
        values.remove(&FieldKey::Timeline);

        let report = validate_completeness(&values);
        assert!(!report.is_valid);
        assert_eq!(
            report.missing_fields,
            vec![FieldKey::Email, FieldKey::Timeline]
        );
    }

    #[test]
    fn test_flatten_nested_profile() {
        let profile = serde_json::json!({
            "name": "Main profile",
            "companyInfo": { "companyName": "Acme Constructors Ltd", "phone": "+254 700 123456" },
            "financialInfo": { "annualTurnover": "50000000" },
            "technicalInfo": { "equipment": "Graders", "personnel": 12 }
        });

        let (values, ignored) = flatten_profile(&profile).unwrap();
        assert_eq!(values.len(), 4);
        assert_eq!(values[&FieldKey::CompanyName], "Acme Constructors Ltd");
        assert_eq!(values[&FieldKey::AnnualTurnover], "50000000");
        assert!(ignored.contains(&"name".to_string()));
        assert!(ignored.contains(&"personnel".to_string()));
    }

    #[test]
    fn test_flatten_flat_profile() {
        let profile = serde_json::json!({ "company_name": "Acme", "tax_id": "A123" });
        let (values, ignored) = flatten_profile(&profile).unwrap();
        assert_eq!(values.len(), 2);
        assert!(ignored.is_empty());
    }

    #[test]
    fn test_flatten_rejects_non_object() {
        assert!(matches!(
            flatten_profile(&serde_json::json!(["a"])),
            Err(Error::InvalidProfile { .. })
        ));
    }
}
