//! Parser for the tabular `api-resources` output
//!
//! Column offsets are computed from the header row: the width of each header
//! name plus its trailing whitespace defines that column's slice range, the
//! last column extends to the end of the line.

use crate::error::{ClientError, Result};

/// Metadata of an API resource type known to the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResourceType {
    pub name: String,
    pub short_names: Vec<String>,
    pub api_group: String,
    pub kind: String,
    pub namespaced: bool,
}

impl ApiResourceType {
    /// The type's first short name, or its name when it has none
    pub fn short_name(&self) -> &str {
        self.short_names.first().map_or(&self.name, String::as_str)
    }

    /// The short name with the API group suffix when there is one
    pub fn full_name(&self) -> String {
        if self.api_group.is_empty() {
            self.short_name().to_string()
        } else {
            format!("{}.{}", self.short_name(), self.api_group)
        }
    }
}

struct Column {
    name: String,
    start: usize,
    end: Option<usize>,
}

pub(crate) fn parse_resource_type_table(input: &str) -> Result<Vec<ApiResourceType>> {
    let mut lines = input.lines();
    let header = lines
        .next()
        .ok_or_else(|| ClientError::parse("api-resources", "empty output"))?;
    let columns = header_columns(header);

    let mut name_col = None;
    let mut short_col = None;
    let mut group_col = None;
    let mut kind_col = None;
    let mut namespaced_col = None;
    let mut duplicate = false;
    for col in &columns {
        let slot = match col.name.as_str() {
            "name" => &mut name_col,
            "shortnames" => &mut short_col,
            "apigroup" => &mut group_col,
            "kind" => &mut kind_col,
            "namespaced" => &mut namespaced_col,
            _ => continue,
        };
        duplicate |= slot.is_some();
        *slot = Some(col);
    }
    let (name_col, short_col, group_col, kind_col, namespaced_col) = match (
        name_col,
        short_col,
        group_col,
        kind_col,
        namespaced_col,
    ) {
        (Some(n), Some(s), Some(g), Some(k), Some(ns)) if !duplicate => (n, s, g, k, ns),
        _ => {
            return Err(ClientError::parse(
                "api-resources",
                "missing NAME, SHORTNAMES, APIGROUP, KIND or NAMESPACED header column",
            ));
        }
    };

    let mut types = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let name = column_value(line, name_col);
        if name.is_empty() {
            return Err(ClientError::parse("api-resources", "empty NAME column"));
        }
        let kind = column_value(line, kind_col);
        if kind.is_empty() {
            return Err(ClientError::parse("api-resources", "empty KIND column"));
        }
        let short_names_csv = column_value(line, short_col);
        let short_names = if short_names_csv.is_empty() {
            Vec::new()
        } else {
            short_names_csv.split(',').map(str::to_string).collect()
        };
        let namespaced = column_value(line, namespaced_col)
            .parse::<bool>()
            .map_err(|e| ClientError::parse("api-resources", format!("namespaced column: {e}")))?;
        types.push(ApiResourceType {
            name: name.to_string(),
            short_names,
            api_group: column_value(line, group_col).to_string(),
            kind: kind.to_string(),
            namespaced,
        });
    }
    Ok(types)
}

fn header_columns(header: &str) -> Vec<Column> {
    let bytes = header.as_bytes();
    let mut columns = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let name_end = i;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        columns.push(Column {
            name: header[start..name_end].to_lowercase(),
            start,
            end: if i >= bytes.len() { None } else { Some(i) },
        });
    }
    columns
}

fn column_value<'a>(line: &'a str, col: &Column) -> &'a str {
    let start = col.start.min(line.len());
    let end = col.end.map_or(line.len(), |e| e.min(line.len()));
    if start >= end {
        return "";
    }
    line[start..end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
NAME                              SHORTNAMES   APIGROUP                       NAMESPACED   KIND
configmaps                        cm                                          true         ConfigMap
namespaces                        ns                                          false        Namespace
pods                              po,shortname                                true         Pod
podtemplates                                                                  true         PodTemplate
deployments                       deploy       apps                           true         Deployment
";

    fn res_type(
        name: &str,
        short_names: &[&str],
        api_group: &str,
        kind: &str,
        namespaced: bool,
    ) -> ApiResourceType {
        ApiResourceType {
            name: name.to_string(),
            short_names: short_names.iter().map(|s| s.to_string()).collect(),
            api_group: api_group.to_string(),
            kind: kind.to_string(),
            namespaced,
        }
    }

    #[test]
    fn test_parse_resource_type_table() {
        let types = parse_resource_type_table(TABLE).unwrap();
        let expected = vec![
            res_type("configmaps", &["cm"], "", "ConfigMap", true),
            res_type("namespaces", &["ns"], "", "Namespace", false),
            res_type("pods", &["po", "shortname"], "", "Pod", true),
            res_type("podtemplates", &[], "", "PodTemplate", true),
            res_type("deployments", &["deploy"], "apps", "Deployment", true),
        ];
        assert_eq!(types, expected);
    }

    #[test]
    fn test_parse_rejects_missing_column() {
        let table = "NAME   APIGROUP   NAMESPACED   KIND\nconfigmaps      true   ConfigMap\n";
        let err = parse_resource_type_table(table).unwrap_err();
        assert!(err.to_string().contains("missing NAME, SHORTNAMES"));
    }

    #[test]
    fn test_short_and_full_name() {
        let t = res_type("deployments", &["deploy"], "apps", "Deployment", true);
        assert_eq!(t.short_name(), "deploy");
        assert_eq!(t.full_name(), "deploy.apps");

        let plain = res_type("podtemplates", &[], "", "PodTemplate", true);
        assert_eq!(plain.short_name(), "podtemplates");
        assert_eq!(plain.full_name(), "podtemplates");
    }
}
