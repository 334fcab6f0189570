use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use url::{Host, Url};

/// Signature of a custom validation rule.
pub type RuleFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A string validation rule applied to the trimmed textual form of a value.
#[derive(Clone)]
pub enum Rule {
    IsEmail,
    IsUrl,
    IsLength { min: usize, max: Option<usize> },
    IsNumeric,
    IsInt,
    IsAlpha,
    IsAlphanumeric,
    IsUuid,
    IsLowercase,
    IsUppercase,
    IsHexColor,
    Custom { name: String, check: RuleFn },
}

impl Rule {
    /// A named custom rule.
    pub fn custom(name: impl Into<String>, check: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Look up a built-in rule by its conventional name (`isEmail`).
    ///
    /// `isLength` reads `min` and optional `max` from `args`.
    pub fn named(name: &str, args: &[usize]) -> Option<Self> {
        let rule = match name {
            "isEmail" => Self::IsEmail,
            "isURL" => Self::IsUrl,
            "isLength" => Self::IsLength {
                min: args.first().copied().unwrap_or(0),
                max: args.get(1).copied(),
            },
            "isNumeric" => Self::IsNumeric,
            "isInt" => Self::IsInt,
            "isAlpha" => Self::IsAlpha,
            "isAlphanumeric" => Self::IsAlphanumeric,
            "isUUID" => Self::IsUuid,
            "isLowercase" => Self::IsLowercase,
            "isUppercase" => Self::IsUppercase,
            "isHexColor" => Self::IsHexColor,
            _ => return None,
        };
        Some(rule)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::IsEmail => "isEmail",
            Self::IsUrl => "isURL",
            Self::IsLength { .. } => "isLength",
            Self::IsNumeric => "isNumeric",
            Self::IsInt => "isInt",
            Self::IsAlpha => "isAlpha",
            Self::IsAlphanumeric => "isAlphanumeric",
            Self::IsUuid => "isUUID",
            Self::IsLowercase => "isLowercase",
            Self::IsUppercase => "isUppercase",
            Self::IsHexColor => "isHexColor",
            Self::Custom { name, .. } => name,
        }
    }

    /// Returns `true` if `text` satisfies the rule.
    pub fn check(&self, text: &str) -> bool {
        match self {
            Self::IsEmail => is_email(text),
            Self::IsUrl => is_url(text),
            Self::IsLength { min, max } => {
                let len = text.chars().count();
                len >= *min && max.map_or(true, |max| len <= max)
            }
            Self::IsNumeric => {
                let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
                !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
            }
            Self::IsInt => {
                let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
                !digits.is_empty()
                    && digits.chars().all(|c| c.is_ascii_digit())
                    && (digits == "0" || !digits.starts_with('0'))
            }
            Self::IsAlpha => !text.is_empty() && text.chars().all(|c| c.is_ascii_alphabetic()),
            Self::IsAlphanumeric => {
                !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric())
            }
            Self::IsUuid => text.len() == 36 && uuid::Uuid::parse_str(text).is_ok(),
            Self::IsLowercase => text == text.to_lowercase(),
            Self::IsUppercase => text == text.to_uppercase(),
            Self::IsHexColor => {
                let hex = text.strip_prefix('#').unwrap_or(text);
                matches!(hex.len(), 3 | 4 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
            }
            Self::Custom { check, .. } => check(text),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IsLength { min, max } => f
                .debug_struct("IsLength")
                .field("min", min)
                .field("max", max)
                .finish(),
            other => write!(f, "Rule({})", other.name()),
        }
    }
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$",
    )
    .expect("email pattern compiles")
});

fn is_email(text: &str) -> bool {
    match text.rsplit_once('@') {
        Some((local, _)) if local.len() <= 64 => EMAIL.is_match(text),
        _ => false,
    }
}

/// `http`, `https` or `ftp` URL with a host. A missing scheme is read as
/// `http`.
fn is_url(text: &str) -> bool {
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return false;
    }
    let candidate = if text.contains("://") {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("http://{text}"))
    };
    let Ok(url) = Url::parse(&candidate) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https" | "ftp") {
        return false;
    }
    match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost" || domain.contains('.'),
        Some(Host::Ipv4(_) | Host::Ipv6(_)) => true,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email() {
        assert!(Rule::IsEmail.check("a@b.com"));
        assert!(Rule::IsEmail.check("john.snow@north.example.org"));
        assert!(!Rule::IsEmail.check("john"));
        assert!(!Rule::IsEmail.check("john@localhost"));
        assert!(!Rule::IsEmail.check("jo hn@b.com"));
        assert!(Rule::IsEmail.check("first+tag@mail.example.co"));
    }

    #[test]
    fn email_rejects_malformed_local_parts() {
        assert!(!Rule::IsEmail.check("a@b@x.com"));
        assert!(!Rule::IsEmail.check("a<b>@x.com"));
        assert!(!Rule::IsEmail.check(".a@x.com"));
        assert!(!Rule::IsEmail.check("a..b@x.com"));
        assert!(!Rule::IsEmail.check(&format!("{}@x.com", "a".repeat(65))));
    }

    #[test]
    fn url() {
        assert!(Rule::IsUrl.check("https://example.com/path?q=1"));
        assert!(Rule::IsUrl.check("example.com"));
        assert!(Rule::IsUrl.check("http://localhost:8080"));
        assert!(!Rule::IsUrl.check("not a url"));
    }

    #[test]
    fn url_checks_port_host_and_scheme() {
        assert!(!Rule::IsUrl.check("http://example.com:99999999999999"));
        assert!(Rule::IsUrl.check("http://[::1]/"));
        assert!(Rule::IsUrl.check("ftp://10.0.0.1/file"));
        assert!(!Rule::IsUrl.check("javascript://example.com"));
        assert!(!Rule::IsUrl.check("http://"));
        assert!(!Rule::IsUrl.check(""));
    }

    #[test]
    fn length() {
        let rule = Rule::named("isLength", &[2, 4]).unwrap();
        assert!(rule.check("ab"));
        assert!(rule.check("abcd"));
        assert!(!rule.check("a"));
        assert!(!rule.check("abcde"));
        assert!(Rule::named("isLength", &[3]).unwrap().check("a long string"));
    }

    #[test]
    fn numeric_and_int() {
        assert!(Rule::IsNumeric.check("0042"));
        assert!(Rule::IsInt.check("-42"));
        assert!(!Rule::IsInt.check("042"));
        assert!(!Rule::IsNumeric.check("4.2"));
    }

    #[test]
    fn character_classes() {
        assert!(Rule::IsAlpha.check("abc"));
        assert!(!Rule::IsAlpha.check("abc1"));
        assert!(Rule::IsAlphanumeric.check("abc1"));
        assert!(Rule::IsLowercase.check("abc1"));
        assert!(!Rule::IsUppercase.check("Abc"));
        assert!(Rule::IsHexColor.check("#ff00aa"));
        assert!(!Rule::IsHexColor.check("#ff00a"));
    }

    #[test]
    fn uuid() {
        assert!(Rule::IsUuid.check("67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert!(!Rule::IsUuid.check("67e5504410b1426f9247bb680e5fe0c8"));
    }

    #[test]
    fn custom_rule() {
        let rule = Rule::custom("startsWithA", |s| s.starts_with('a'));
        assert_eq!(rule.name(), "startsWithA");
        assert!(rule.check("abc"));
        assert!(!rule.check("bcd"));
    }

    #[test]
    fn unknown_named_rule() {
        assert!(Rule::named("isPrime", &[]).is_none());
        assert_eq!(Rule::named("isEmail", &[]).unwrap().name(), "isEmail");
    }
}
