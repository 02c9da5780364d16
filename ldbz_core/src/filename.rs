use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Table file extensions. Both name the same logical file type; `.ldb` is
/// what newer writers produce, `.sst` what older ones did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableSuffix {
    Sst,
    Ldb,
}

impl TableSuffix {
    pub fn extension(self) -> &'static str {
        match self {
            TableSuffix::Sst => "sst",
            TableSuffix::Ldb => "ldb",
        }
    }
}

/// A parsed table file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableFile {
    pub number: u64,
    pub suffix: TableSuffix,
}

impl TableFile {
    pub fn file_name(&self) -> String {
        table_file_name(self.number, self.suffix)
    }
}

impl fmt::Display for TableFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// `000042.ldb` style name: at least six zero-padded digits.
pub fn table_file_name(number: u64, suffix: TableSuffix) -> String {
    format!("{:06}.{}", number, suffix.extension())
}

/// Parse a bare file name. Returns `None` for anything that is not a table.
pub fn parse_table_file_name(name: &str) -> Option<TableFile> {
    let (stem, ext) = name.rsplit_once('.')?;
    let suffix = match ext {
        "sst" => TableSuffix::Sst,
        "ldb" => TableSuffix::Ldb,
        _ => return None,
    };
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number = stem.parse().ok()?;
    Some(TableFile { number, suffix })
}

/// Every table file directly inside `dir`, ordered by file number.
pub fn list_table_files(dir: impl AsRef<Path>) -> Result<Vec<(TableFile, PathBuf)>> {
    let mut tables = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(table) = name.to_str().and_then(parse_table_file_name) {
            tables.push((table, entry.path()));
        }
    }
    tables.sort_by_key(|(table, _)| table.number);
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_zero_padded() {
        assert_eq!(table_file_name(7, TableSuffix::Sst), "000007.sst");
        assert_eq!(table_file_name(123456, TableSuffix::Ldb), "123456.ldb");
        assert_eq!(table_file_name(1234567, TableSuffix::Ldb), "1234567.ldb");
    }

    #[test]
    fn both_suffixes_parse_as_tables() {
        let sst = parse_table_file_name("000012.sst").unwrap();
        let ldb = parse_table_file_name("000012.ldb").unwrap();
        assert_eq!(sst.number, 12);
        assert_eq!(ldb.number, 12);
        assert_eq!(sst.suffix, TableSuffix::Sst);
        assert_eq!(ldb.suffix, TableSuffix::Ldb);
    }

    #[test]
    fn non_tables_are_ignored() {
        let not_tables = [
            "CURRENT",
            "LOCK",
            "000003.log",
            "MANIFEST-000002",
            "abc.ldb",
            ".ldb",
            "12.ldb.tmp",
            "-1.sst",
        ];
        for name in not_tables {
            assert!(parse_table_file_name(name).is_none(), "{name} parsed as a table");
        }
    }
}
