//! Input validators shared by the handlers.

use crate::errors::AppError;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_BANK_CODE: &str = "001";
pub const MAX_BILL_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_FULL_NAME_CHARS: usize = 120;

/// Validate and normalize a Brazilian phone number to E.164 (+5591987654321).
pub fn validate_br_phone(raw: &str) -> Result<String, AppError> {
    let raw = raw.trim();
    if raw.len() < 8 {
        return Err(AppError::BadRequest("Telefone muito curto".to_string()));
    }

    match phonenumber::parse(Some(CountryId::BR), raw) {
        Ok(number) if phonenumber::is_valid(&number) => {
            let formatted = number.format().mode(Mode::E164).to_string();
            tracing::debug!("Valid BR phone: {} -> {}", raw, formatted);
            Ok(formatted)
        }
        Ok(_) => Err(AppError::BadRequest(
            "Número de telefone brasileiro inválido".to_string(),
        )),
        Err(e) => {
            tracing::warn!("Failed to parse BR phone '{}': {:?}", raw, e);
            Err(AppError::BadRequest(
                "Número de telefone brasileiro inválido".to_string(),
            ))
        }
    }
}

fn bank_code_pattern() -> Result<&'static Regex, AppError> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = PATTERN.get() {
        return Ok(re);
    }
    let re = Regex::new(r"^\d{3}$")
        .map_err(|e| AppError::InternalError(format!("Invalid bank code pattern: {}", e)))?;
    Ok(PATTERN.get_or_init(|| re))
}

/// Three-digit COMPE bank code; `001` (Banco do Brasil) when absent.
pub fn validate_bank_code(code: Option<&str>) -> Result<String, AppError> {
    let code = code.map(str::trim).filter(|c| !c.is_empty());
    match code {
        None => Ok(DEFAULT_BANK_CODE.to_string()),
        Some(c) if bank_code_pattern()?.is_match(c) => Ok(c.to_string()),
        Some(c) => Err(AppError::BadRequest(format!(
            "Invalid bank code '{}': expected 3 digits",
            c
        ))),
    }
}

/// Bills must be a PDF or an image no larger than 10 MB.
pub fn validate_bill_file(file_type: &str, file_size: Option<u64>) -> Result<(), AppError> {
    let file_type = file_type.trim().to_ascii_lowercase();
    if file_type != "application/pdf" && !file_type.starts_with("image/") {
        return Err(AppError::BadRequest(
            "Por favor, envie um arquivo PDF ou imagem".to_string(),
        ));
    }
    if let Some(size) = file_size {
        if size > MAX_BILL_FILE_BYTES {
            return Err(AppError::BadRequest(
                "O arquivo deve ter no máximo 10MB".to_string(),
            ));
        }
    }
    Ok(())
}

pub fn validate_full_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Nome não pode ser vazio".to_string()));
    }
    if name.chars().count() > MAX_FULL_NAME_CHARS {
        return Err(AppError::BadRequest(format!(
            "Nome deve ter no máximo {} caracteres",
            MAX_FULL_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_br_phone_normalized() {
        assert_eq!(
            validate_br_phone("(91) 98765-4321").unwrap(),
            "+5591987654321"
        );
        assert!(validate_br_phone("123").is_err());
        assert!(validate_br_phone("abcdefghij").is_err());
    }

    #[test]
    fn test_bank_code() {
        assert_eq!(validate_bank_code(None).unwrap(), "001");
        assert_eq!(validate_bank_code(Some("  ")).unwrap(), "001");
        assert_eq!(validate_bank_code(Some("341")).unwrap(), "341");
        assert!(validate_bank_code(Some("34")).is_err());
        assert!(validate_bank_code(Some("3411")).is_err());
        assert!(validate_bank_code(Some("ab1")).is_err());
    }

    #[test]
    fn test_bill_file() {
        assert!(validate_bill_file("application/pdf", Some(1024)).is_ok());
        assert!(validate_bill_file("image/jpeg", None).is_ok());
        assert!(validate_bill_file("IMAGE/PNG", Some(MAX_BILL_FILE_BYTES)).is_ok());
        assert!(validate_bill_file("text/plain", None).is_err());
        assert!(validate_bill_file("application/pdf", Some(MAX_BILL_FILE_BYTES + 1)).is_err());
    }

    #[test]
    fn test_full_name() {
        assert_eq!(validate_full_name("  Maria Santos ").unwrap(), "Maria Santos");
        assert!(validate_full_name("   ").is_err());
        assert!(validate_full_name(&"a".repeat(121)).is_err());
    }
}
