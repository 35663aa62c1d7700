use crate::document::Document;
use crate::error::SecurityWarning;

const P_PRINT: u32 = 1 << 2;
const P_EDIT: u32 = 1 << 3;
const P_COPY: u32 = 1 << 4;
const P_ANNOTATE: u32 = 1 << 5;
const P_FILL_FORMS: u32 = 1 << 8;
// Bits 7-8 and 13-32 are reserved and must be set; bits 1-2 must be clear.
const P_RESERVED: u32 = 0xFFFF_F0C0;

/// What a user-password holder may do. An owner-password holder always has
/// full permissions regardless of these flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub print: bool,
    pub copy_content: bool,
    pub edit: bool,
    pub annotate: bool,
    pub fill_forms: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::all()
    }
}

impl Permissions {
    pub fn all() -> Self {
        Self {
            print: true,
            copy_content: true,
            edit: true,
            annotate: true,
            fill_forms: true,
        }
    }

    pub fn none() -> Self {
        Self {
            print: false,
            copy_content: false,
            edit: false,
            annotate: false,
            fill_forms: false,
        }
    }

    pub fn restricts_content(&self) -> bool {
        !(self.print && self.copy_content && self.edit && self.annotate && self.fill_forms)
    }

    /// Encode as the `/P` entry of the standard security handler.
    pub fn to_p(&self) -> i64 {
        let mut p = P_RESERVED;
        if self.print {
            p |= P_PRINT;
        }
        if self.edit {
            p |= P_EDIT;
        }
        if self.copy_content {
            p |= P_COPY;
        }
        if self.annotate {
            p |= P_ANNOTATE;
        }
        if self.fill_forms {
            p |= P_FILL_FORMS;
        }
        p as i32 as i64
    }

    pub fn from_p(p: i64) -> Self {
        let p = p as i32 as u32;
        Self {
            print: p & P_PRINT != 0,
            edit: p & P_EDIT != 0,
            copy_content: p & P_COPY != 0,
            annotate: p & P_ANNOTATE != 0,
            fill_forms: p & P_FILL_FORMS != 0,
        }
    }
}

/// Password protection and permission flags, applied at serialization time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecuritySettings {
    pub owner_password: Option<String>,
    pub user_password: Option<String>,
    pub permissions: Permissions,
}

impl SecuritySettings {
    pub fn with_user_password(password: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            owner_password: None,
            user_password: Some(password.into()),
            permissions,
        }
    }
}

/// Apply security settings to a document. Idempotent: applying twice keeps the
/// last settings only. Returns non-fatal warnings; weak-password findings are
/// also logged.
pub fn secure(doc: &mut Document, settings: SecuritySettings) -> Vec<SecurityWarning> {
    let mut warnings = Vec::new();
    if settings.permissions.restricts_content() {
        for (which, password) in [
            ("user", settings.user_password.as_deref()),
            ("owner", settings.owner_password.as_deref()),
        ] {
            if password == Some("") {
                let warning = SecurityWarning::WeakPassword { which };
                log::warn!("{}", warning);
                warnings.push(warning);
            }
        }
    }
    doc.security = Some(settings);
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p_round_trip() {
        let perms = Permissions {
            print: false,
            copy_content: true,
            edit: false,
            annotate: true,
            fill_forms: false,
        };
        assert_eq!(Permissions::from_p(perms.to_p()), perms);
        // Reserved bits are set, so /P is negative as a signed value.
        assert!(perms.to_p() < 0);
        assert_eq!(Permissions::from_p(Permissions::all().to_p()), Permissions::all());
    }

    #[test]
    fn secure_is_last_write_wins() {
        let mut doc = Document::new();
        let first = SecuritySettings::with_user_password("a", Permissions::none());
        let second = SecuritySettings::with_user_password("b", Permissions::all());
        secure(&mut doc, first);
        secure(&mut doc, second.clone());
        assert_eq!(doc.security, Some(second));
    }

    #[test]
    fn empty_password_with_restrictions_warns() {
        let mut doc = Document::new();
        let settings = SecuritySettings {
            owner_password: None,
            user_password: Some(String::new()),
            permissions: Permissions {
                print: false,
                ..Permissions::all()
            },
        };
        let warnings = secure(&mut doc, settings);
        assert_eq!(
            warnings,
            vec![SecurityWarning::WeakPassword { which: "user" }]
        );
    }

    #[test]
    fn empty_password_with_full_permissions_is_fine() {
        let mut doc = Document::new();
        let settings = SecuritySettings {
            owner_password: Some(String::new()),
            user_password: None,
            permissions: Permissions::all(),
        };
        assert!(secure(&mut doc, settings).is_empty());
    }
}
