//! Statement classification and small SQL helpers.

use std::path::Path;

/// Coarse statement kind, decided from the first keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    /// `SELECT`
    Select,
    /// `INSERT`
    Insert,
    /// `UPDATE` / `REPLACE`
    Update,
    /// `DELETE`
    Delete,
    /// `ATTACH`
    Attach,
    /// `DETACH`
    Detach,
    /// `BEGIN`
    Begin,
    /// `COMMIT` / `END`
    Commit,
    /// `ROLLBACK`
    Rollback,
    /// `SAVEPOINT`
    Savepoint,
    /// `RELEASE`
    Release,
    /// `PRAGMA`
    Pragma,
    /// `CREATE` / `DROP` / `ALTER`
    Ddl,
    /// Anything else (`WITH`, `VACUUM`, `ANALYZE`, ...).
    Other,
}

impl StatementType {
    /// Assumed read-only before the engine has compiled the statement.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::Select)
    }

    /// Transaction-control statements, which must go through the
    /// transaction API instead of the generic execute path.
    #[must_use]
    pub const fn is_special(self) -> bool {
        matches!(
            self,
            Self::Begin | Self::Commit | Self::Rollback | Self::Savepoint | Self::Release
        )
    }

    /// Schema changes.
    #[must_use]
    pub const fn is_ddl(self) -> bool {
        matches!(self, Self::Ddl)
    }
}

/// Classifies `sql` from its first three non-blank characters.
#[must_use]
pub fn statement_type(sql: &str) -> StatementType {
    let trimmed = sql.trim_start();
    let prefix: String = trimmed.chars().take(3).collect::<String>().to_ascii_uppercase();
    match prefix.as_str() {
        "SEL" => StatementType::Select,
        "INS" => StatementType::Insert,
        "UPD" | "REP" => StatementType::Update,
        "DEL" => StatementType::Delete,
        "ATT" => StatementType::Attach,
        "DET" => StatementType::Detach,
        "BEG" => StatementType::Begin,
        "COM" | "END" => StatementType::Commit,
        "ROL" => StatementType::Rollback,
        "SAV" => StatementType::Savepoint,
        "REL" => StatementType::Release,
        "PRA" => StatementType::Pragma,
        "CRE" | "DRO" | "ALT" => StatementType::Ddl,
        _ => StatementType::Other,
    }
}

/// Conflict handling for `INSERT` / `UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictResolution {
    /// Engine default (`ABORT`), no clause emitted.
    #[default]
    None,
    /// `OR ROLLBACK`
    Rollback,
    /// `OR ABORT`
    Abort,
    /// `OR FAIL`
    Fail,
    /// `OR IGNORE`
    Ignore,
    /// `OR REPLACE`
    Replace,
}

impl ConflictResolution {
    /// Clause inserted right after the verb, with a leading space.
    #[must_use]
    pub const fn clause(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Rollback => " OR ROLLBACK",
            Self::Abort => " OR ABORT",
            Self::Fail => " OR FAIL",
            Self::Ignore => " OR IGNORE",
            Self::Replace => " OR REPLACE",
        }
    }
}

/// Renders a path for logs: directories are dropped and most of the file
/// name is masked.
#[must_use]
pub fn anonymous_path(path: &Path) -> String {
    let Some(file_name) = path.file_name() else {
        return "***".to_string();
    };
    let file_name = file_name.to_string_lossy();
    let (stem, ext) = file_name
        .rsplit_once('.')
        .unwrap_or((&*file_name, ""));
    let visible: String = stem.chars().take(2).collect();
    if ext.is_empty() {
        format!("***/{visible}***")
    } else {
        format!("***/{visible}***.{ext}")
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("SELECT * FROM t", StatementType::Select ; "select")]
    #[test_case("  select 1", StatementType::Select ; "leading blanks and lowercase")]
    #[test_case("INSERT INTO t VALUES (1)", StatementType::Insert ; "insert")]
    #[test_case("REPLACE INTO t VALUES (1)", StatementType::Update ; "replace")]
    #[test_case("update t set a = 1", StatementType::Update ; "update")]
    #[test_case("DELETE FROM t", StatementType::Delete ; "delete")]
    #[test_case("ATTACH DATABASE 'x' AS y", StatementType::Attach ; "attach")]
    #[test_case("DETACH y", StatementType::Detach ; "detach")]
    #[test_case("BEGIN EXCLUSIVE;", StatementType::Begin ; "begin")]
    #[test_case("END", StatementType::Commit ; "end")]
    #[test_case("COMMIT;", StatementType::Commit ; "commit")]
    #[test_case("ROLLBACK", StatementType::Rollback ; "rollback")]
    #[test_case("SAVEPOINT SP1", StatementType::Savepoint ; "savepoint")]
    #[test_case("RELEASE SAVEPOINT SP1", StatementType::Release ; "release")]
    #[test_case("PRAGMA user_version", StatementType::Pragma ; "pragma")]
    #[test_case("CREATE TABLE t (a)", StatementType::Ddl ; "create")]
    #[test_case("DROP TABLE t", StatementType::Ddl ; "drop")]
    #[test_case("ALTER TABLE t ADD b", StatementType::Ddl ; "alter")]
    #[test_case("VACUUM", StatementType::Other ; "other")]
    #[test_case("", StatementType::Other ; "empty")]
    fn test_statement_type(sql: &str, expected: StatementType) {
        assert_eq!(statement_type(sql), expected);
    }

    #[test]
    fn test_special_and_read_only() {
        assert!(StatementType::Begin.is_special());
        assert!(StatementType::Release.is_special());
        assert!(!StatementType::Insert.is_special());
        assert!(StatementType::Select.is_read_only());
        assert!(!StatementType::Pragma.is_read_only());
    }

    #[test]
    fn test_conflict_clause() {
        assert_eq!(ConflictResolution::None.clause(), "");
        assert_eq!(ConflictResolution::Replace.clause(), " OR REPLACE");
    }

    #[test]
    fn test_anonymous_path() {
        assert_eq!(anonymous_path(Path::new("/data/app/notes.db")), "***/no***.db");
        assert_eq!(anonymous_path(Path::new("journal")), "***/jo***");
    }
}
