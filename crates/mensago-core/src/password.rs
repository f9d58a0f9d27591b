//! Password strength checks and Argon2id hashing

use std::fmt;
use std::sync::LazyLock;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use mensago_common::{MensagoError, Result};

/// Minimum acceptable passphrase length
pub const MIN_PASSWORD_LENGTH: usize = 8;

static PUNCTUATION: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"[~`!@#$%^&*()_={}/<>,.:;|'\[\]"\\\-+?]"#).expect("valid punctuation regex")
});

/// Passphrase strength, ordered weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strength {
    VeryWeak,
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

impl Strength {
    pub fn as_str(self) -> &'static str {
        match self {
            Strength::VeryWeak => "very weak",
            Strength::Weak => "weak",
            Strength::Medium => "medium",
            Strength::Strong => "strong",
            Strength::VeryStrong => "very strong",
        }
    }

    fn from_score(score: usize) -> Self {
        match score {
            0 | 1 => Strength::VeryWeak,
            2 => Strength::Weak,
            3 => Strength::Medium,
            4 => Strength::Strong,
            _ => Strength::VeryStrong,
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn weak(strength: Strength) -> MensagoError {
    MensagoError::WeakPassword {
        strength: strength.to_string(),
    }
}

/// Scores a passphrase, failing if it is too weak to use.
///
/// Each of these adds a point: non-ASCII text, a digit, an uppercase
/// letter, a lowercase letter, punctuation. Passphrases under 12 characters
/// need at least 3 points; longer ones need at least 2.
pub fn check_password_complexity(password: &str) -> Result<Strength> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(weak(Strength::VeryWeak));
    }

    let score = [
        !password.is_ascii(),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_lowercase()),
        PUNCTUATION.is_match(password),
    ]
    .into_iter()
    .filter(|hit| *hit)
    .count();

    let strength = Strength::from_score(score);
    if (length < 12 && score < 3) || score < 2 {
        return Err(weak(strength));
    }
    Ok(strength)
}

/// A hashed password in PHC string form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Password {
    hash: String,
    strength: Option<Strength>,
}

impl Password {
    /// Checks strength and hashes the given passphrase
    pub fn new(text: &str) -> Result<Self> {
        let mut password = Self::default();
        password.set(text)?;
        Ok(password)
    }

    pub fn set(&mut self, text: &str) -> Result<Strength> {
        let strength = check_password_complexity(text)?;
        let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
            .map_err(|e| MensagoError::BadValue(format!("salt generation failed: {}", e)))?;
        self.hash = Argon2::default()
            .hash_password(text.as_bytes(), &salt)
            .map_err(|e| MensagoError::BadValue(format!("password hashing failed: {}", e)))?
            .to_string();
        self.strength = Some(strength);
        Ok(strength)
    }

    /// Adopts an existing PHC hash string
    pub fn assign(&mut self, hash: &str) -> Result<()> {
        PasswordHash::new(hash)
            .map_err(|e| MensagoError::BadValue(format!("bad password hash: {}", e)))?;
        self.hash = hash.to_string();
        self.strength = None;
        Ok(())
    }

    pub fn from_hash(hash: &str) -> Result<Self> {
        let mut password = Self::default();
        password.assign(hash)?;
        Ok(password)
    }

    pub fn check(&self, text: &str) -> bool {
        match PasswordHash::new(&self.hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(text.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn hash_type(&self) -> &'static str {
        "argon2id"
    }

    pub fn strength(&self) -> Option<Strength> {
        self.strength
    }

    pub fn is_valid(&self) -> bool {
        !self.hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_too_short() {
        assert!(matches!(
            check_password_complexity("Aa1!"),
            Err(MensagoError::WeakPassword { strength }) if strength == "very weak"
        ));
    }

    #[test]
    fn test_complexity_scores() {
        // Short passwords need three character classes
        assert!(check_password_complexity("abcdefgh").is_err());
        assert!(check_password_complexity("abcdefg1").is_err());
        assert_eq!(check_password_complexity("abcdefG1").unwrap(), Strength::Medium);

        // Long passwords need two
        assert!(check_password_complexity("abcdefghijklmn").is_err());
        assert_eq!(check_password_complexity("abcdefghijkl12").unwrap(), Strength::Weak);

        assert_eq!(check_password_complexity("MyS3cretPass!").unwrap(), Strength::Strong);
        assert_eq!(
            check_password_complexity("Ünïcødé Pass 1!").unwrap(),
            Strength::VeryStrong
        );
    }

    #[test]
    fn test_password_hash_and_check() {
        let pw = Password::new("MyS3cretPass!").unwrap();
        assert!(pw.is_valid());
        assert!(pw.hash().starts_with("$argon2id$"));
        assert!(pw.check("MyS3cretPass!"));
        assert!(!pw.check("wrong"));

        let assigned = Password::from_hash(pw.hash()).unwrap();
        assert!(assigned.check("MyS3cretPass!"));
        assert!(Password::from_hash("not a hash").is_err());
        assert!(!Password::default().is_valid());
    }
}
