//! Structural and referential checks of a candidate statement.
//!
//! Checks run in order: lexical well-formedness, parsing for the dialect,
//! table existence, column existence, and finally the statement type. The
//! statement is never executed.

use sqlparser::ast::{
    AlterTableOperation, AssignmentTarget, ColumnDef, ColumnOption, Expr, ObjectName, Query,
    SelectItem, SetExpr, Statement, TableConstraint, TableFactor, Visit, Visitor,
};
use sqlparser::parser::Parser;
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use thiserror::Error;

use super::lexer::{lex, Lexed};
use super::{SqlDialect, StatementKind, StatementProfile};
use crate::schema::{SchemaSnapshot, TableSchema};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("syntax error: {message}")]
    Syntax { message: String },

    #[error("expected a single statement, found {count}")]
    MultipleStatements { count: usize },

    #[error("unknown table '{table}'")]
    UnknownTable { table: String },

    #[error("unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("unsupported statement type '{keyword}'")]
    UnsupportedStatement { keyword: String },
}

impl ValidationError {
    fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
    pub errors: Vec<ValidationError>,
    pub profile: StatementProfile,
    /// Referenced tables, as declared in the snapshot
    pub tables: Vec<String>,
    /// Resolved `table.column` references
    pub columns: Vec<String>,
    /// Canonical rendering of the parsed statement
    pub normalized: Option<String>,
}

impl ValidationReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn validate(sql: &str, snapshot: &SchemaSnapshot, dialect: SqlDialect) -> ValidationReport {
    let parser_dialect = dialect.parser_dialect();
    let lexed = lex(sql, &*parser_dialect);
    let mut report = ValidationReport {
        warnings: Vec::new(),
        errors: Vec::new(),
        profile: lexical_profile(&lexed),
        tables: Vec::new(),
        columns: Vec::new(),
        normalized: None,
    };

    if lexed.statements.is_empty() {
        report.errors.push(ValidationError::syntax("empty statement"));
        return report;
    }

    if !lexed.problems.is_empty() {
        report.errors.extend(
            lexed
                .problems
                .iter()
                .map(|p| ValidationError::syntax(p.to_string())),
        );
    } else {
        match Parser::parse_sql(&*parser_dialect, sql) {
            Err(e) => report.errors.push(ValidationError::syntax(e.to_string())),
            Ok(statements) if statements.len() != 1 => {
                report.errors.push(ValidationError::MultipleStatements {
                    count: statements.len(),
                });
            }
            Ok(statements) => {
                let statement = &statements[0];
                report.profile = statement_profile(statement, &lexed);
                report.normalized = Some(format!("{};", statement));
                check_references(statement, snapshot, &mut report);
            }
        }
    }

    if let StatementKind::Other(keyword) = &report.profile.kind {
        report.errors.push(ValidationError::UnsupportedStatement {
            keyword: keyword.clone(),
        });
    }

    tracing::debug!(
        kind = %report.profile.kind,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "candidate validated"
    );
    report
}

/// Kind and WHERE presence from tokens alone, used when parsing fails
fn lexical_profile(lexed: &Lexed) -> StatementProfile {
    StatementProfile {
        kind: lexed
            .leading_word()
            .map(StatementKind::from_keyword)
            .unwrap_or_else(|| StatementKind::Other(String::new())),
        has_where: lexed.has_top_level_where(),
    }
}

fn statement_profile(statement: &Statement, lexed: &Lexed) -> StatementProfile {
    match statement {
        Statement::Query(query) => StatementProfile {
            kind: StatementKind::Select,
            has_where: matches!(query.body.as_ref(), SetExpr::Select(select) if select.selection.is_some()),
        },
        Statement::Insert(_) => StatementProfile {
            kind: StatementKind::Insert,
            has_where: false,
        },
        Statement::Update { selection, .. } => StatementProfile {
            kind: StatementKind::Update,
            has_where: selection.is_some(),
        },
        Statement::Delete(delete) => StatementProfile {
            kind: StatementKind::Delete,
            has_where: delete.selection.is_some(),
        },
        _ => lexical_profile(lexed),
    }
}

#[derive(Debug, Clone)]
struct TableRef {
    qualifier: Option<String>,
    name: String,
    alias: Option<String>,
}

impl TableRef {
    fn from_object(name: &ObjectName, alias: Option<String>) -> Self {
        let parts = &name.0;
        Self {
            qualifier: (parts.len() > 1).then(|| parts[0].value.clone()),
            name: parts.last().map(|i| i.value.clone()).unwrap_or_default(),
            alias,
        }
    }
}

#[derive(Debug, Clone)]
struct ColumnRef {
    qualifier: Option<String>,
    name: String,
}

/// Collects table and column references anywhere in a statement
#[derive(Default)]
struct References {
    tables: Vec<TableRef>,
    ctes: HashSet<String>,
    derived_aliases: HashSet<String>,
    select_aliases: HashSet<String>,
    columns: Vec<ColumnRef>,
    cartesian: bool,
}

impl Visitor for References {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
            }
        }
        if let SetExpr::Select(select) = query.body.as_ref() {
            for item in &select.projection {
                if let SelectItem::ExprWithAlias { alias, .. } = item {
                    self.select_aliases.insert(alias.value.to_lowercase());
                }
            }
            let joined = select.from.iter().any(|t| !t.joins.is_empty());
            if select.from.len() > 1 && !joined && select.selection.is_none() {
                self.cartesian = true;
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let alias = alias.as_ref().map(|a| a.name.value.clone());
                self.tables.push(TableRef::from_object(name, alias));
            }
            TableFactor::Derived {
                alias: Some(alias), ..
            } => {
                self.derived_aliases.insert(alias.name.value.to_lowercase());
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => self.columns.push(ColumnRef {
                qualifier: None,
                name: ident.value.clone(),
            }),
            Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
                self.columns.push(ColumnRef {
                    qualifier: Some(parts[parts.len() - 2].value.clone()),
                    name: parts[parts.len() - 1].value.clone(),
                });
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

fn check_references(statement: &Statement, snapshot: &SchemaSnapshot, report: &mut ValidationReport) {
    let mut refs = References::default();
    let _ = statement.visit(&mut refs);

    let mut created: Option<&ObjectName> = None;
    // Column targets that must exist on a specific table
    let mut targets: Vec<(TableRef, Vec<ColumnRef>)> = Vec::new();

    match statement {
        Statement::Insert(insert) => {
            let table = TableRef::from_object(&insert.table_name, None);
            let columns = insert
                .columns
                .iter()
                .map(|c| ColumnRef {
                    qualifier: None,
                    name: c.value.clone(),
                })
                .collect();
            refs.tables.push(table.clone());
            targets.push((table, columns));
        }
        Statement::Update {
            table, assignments, ..
        } => {
            if let TableFactor::Table { name, alias, .. } = &table.relation {
                let target = TableRef::from_object(name, alias.as_ref().map(|a| a.name.value.clone()));
                let columns = assignments
                    .iter()
                    .filter_map(|a| match &a.target {
                        AssignmentTarget::ColumnName(column) => column.0.last().map(|i| ColumnRef {
                            qualifier: None,
                            name: i.value.clone(),
                        }),
                        _ => None,
                    })
                    .collect();
                targets.push((target, columns));
            }
        }
        Statement::CreateTable(create) => {
            created = Some(&create.name);
            let own = create.name.0.last().map(|i| i.value.to_lowercase());
            let referenced = create
                .columns
                .iter()
                .flat_map(column_references)
                .chain(create.constraints.iter().filter_map(constraint_reference))
                .map(|name| TableRef::from_object(name, None))
                .filter(|table| own.as_deref() != Some(table.name.to_lowercase().as_str()));
            refs.tables.extend(referenced);
        }
        Statement::CreateView { name, .. } => created = Some(name),
        Statement::CreateIndex(index) => {
            refs.tables.push(TableRef::from_object(&index.table_name, None));
        }
        Statement::AlterTable {
            name, operations, ..
        } => {
            refs.tables.push(TableRef::from_object(name, None));
            for operation in operations {
                let referenced: Vec<&ObjectName> = match operation {
                    AlterTableOperation::AddConstraint(constraint) => {
                        constraint_reference(constraint).into_iter().collect()
                    }
                    AlterTableOperation::AddColumn { column_def, .. } => {
                        column_references(column_def).collect()
                    }
                    _ => Vec::new(),
                };
                refs.tables
                    .extend(referenced.into_iter().map(|n| TableRef::from_object(n, None)));
            }
        }
        Statement::Drop { names, .. } => {
            refs.tables
                .extend(names.iter().map(|n| TableRef::from_object(n, None)));
        }
        _ => {}
    }

    if let Some(name) = created {
        let target = TableRef::from_object(name, None);
        if snapshot
            .find_table(target.qualifier.as_deref(), &target.name)
            .is_some()
        {
            report
                .warnings
                .push(format!("table '{}' already exists", target.name));
        }
    }

    // Tables: every reference outside CTE names must exist
    let mut scope: HashMap<String, &TableSchema> = HashMap::new();
    let mut in_scope: Vec<&TableSchema> = Vec::new();
    let mut unknown = HashSet::new();
    for table_ref in &refs.tables {
        if table_ref.qualifier.is_none() && refs.ctes.contains(&table_ref.name.to_lowercase()) {
            continue;
        }
        match snapshot.find_table(table_ref.qualifier.as_deref(), &table_ref.name) {
            Some(table) => {
                if !in_scope.iter().any(|t| std::ptr::eq(*t, table)) {
                    in_scope.push(table);
                    push_unique(&mut report.tables, table.name.clone());
                }
                scope.insert(table_ref.name.to_lowercase(), table);
                if let Some(alias) = &table_ref.alias {
                    scope.insert(alias.to_lowercase(), table);
                }
            }
            None => {
                if unknown.insert(table_ref.name.to_lowercase()) {
                    report.errors.push(ValidationError::UnknownTable {
                        table: table_ref.name.clone(),
                    });
                }
            }
        }
    }

    if refs.cartesian {
        report.warnings.push(
            "multiple tables in FROM without JOIN or WHERE (possible Cartesian product)".to_string(),
        );
    }

    // DDL bodies (defaults, checks) reference columns of tables being defined
    let checks_columns = matches!(
        report.profile.kind,
        StatementKind::Select | StatementKind::Insert | StatementKind::Update | StatementKind::Delete
    );
    if !checks_columns {
        return;
    }

    for (target, columns) in &targets {
        let Some(table) = snapshot.find_table(target.qualifier.as_deref(), &target.name) else {
            continue;
        };
        for column in columns {
            match table.column(&column.name) {
                Some(found) => record_column(report, table, &found.name),
                None => push_unique(
                    &mut report.errors,
                    ValidationError::UnknownColumn {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    },
                ),
            }
        }
    }

    for column in &refs.columns {
        match &column.qualifier {
            Some(qualifier) => match scope.get(&qualifier.to_lowercase()) {
                Some(table) => match table.column(&column.name) {
                    Some(found) => record_column(report, table, &found.name),
                    None => push_unique(
                        &mut report.errors,
                        ValidationError::UnknownColumn {
                            table: table.name.clone(),
                            column: column.name.clone(),
                        },
                    ),
                },
                // Columns of derived tables and CTEs are not in the snapshot
                None if refs.derived_aliases.contains(&qualifier.to_lowercase())
                    || refs.ctes.contains(&qualifier.to_lowercase()) => {}
                None => push_unique(
                    &mut report.warnings,
                    format!("could not resolve column '{}.{}'", qualifier, column.name),
                ),
            },
            None => {
                let owner = in_scope.iter().find(|t| t.has_column(&column.name));
                match owner {
                    Some(table) => {
                        if let Some(found) = table.column(&column.name) {
                            record_column(report, table, &found.name);
                        }
                    }
                    None if refs.select_aliases.contains(&column.name.to_lowercase()) => {}
                    None => push_unique(
                        &mut report.warnings,
                        format!("could not resolve column '{}'", column.name),
                    ),
                }
            }
        }
    }
}

/// Tables named by `REFERENCES` clauses on a column definition
fn column_references(column: &ColumnDef) -> impl Iterator<Item = &ObjectName> {
    column.options.iter().filter_map(|def| match &def.option {
        ColumnOption::ForeignKey { foreign_table, .. } => Some(foreign_table),
        _ => None,
    })
}

fn constraint_reference(constraint: &TableConstraint) -> Option<&ObjectName> {
    match constraint {
        TableConstraint::ForeignKey { foreign_table, .. } => Some(foreign_table),
        _ => None,
    }
}

fn record_column(report: &mut ValidationReport, table: &TableSchema, column: &str) {
    push_unique(&mut report.columns, format!("{}.{}", table.name, column));
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::parse_text(
            "Database: company\n\
             Table departments: id (int, PK), title (varchar)\n\
             Table employees: id (int, PK), name (varchar), department (varchar), dept_id (int, FK -> departments.id)\n\
             Table students: id (int, PK), name (varchar), surname (varchar)\n",
        )
        .unwrap()
    }

    fn check(sql: &str) -> ValidationReport {
        validate(sql, &snapshot(), SqlDialect::Mysql)
    }

    #[test]
    fn test_valid_select_has_no_warnings() {
        let report = check("SELECT * FROM employees WHERE department='Engineering';");
        assert!(report.ok(), "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.profile.kind, StatementKind::Select);
        assert_eq!(report.tables, vec!["employees"]);
        assert_eq!(report.columns, vec!["employees.department"]);
    }

    #[test]
    fn test_unknown_table_is_error() {
        let report = check("SELECT * FROM courses;");
        assert!(!report.ok());
        assert_eq!(
            report.errors,
            vec![ValidationError::UnknownTable {
                table: "courses".to_string()
            }]
        );
    }

    #[test]
    fn test_unknown_table_in_subquery_is_error() {
        let report = check("SELECT name FROM employees WHERE dept_id IN (SELECT id FROM offices);");
        assert!(report
            .errors
            .contains(&ValidationError::UnknownTable {
                table: "offices".to_string()
            }));
    }

    #[test]
    fn test_qualified_missing_column_is_error() {
        let report = check(
            "SELECT e.salary FROM employees e JOIN departments d ON e.dept_id = d.id;",
        );
        assert_eq!(
            report.errors,
            vec![ValidationError::UnknownColumn {
                table: "employees".to_string(),
                column: "salary".to_string()
            }]
        );
    }

    #[test]
    fn test_unresolved_unqualified_column_is_warning() {
        let report = check("SELECT salary FROM employees;");
        assert!(report.ok());
        assert_eq!(report.warnings, vec!["could not resolve column 'salary'"]);
    }

    #[test]
    fn test_projection_alias_and_cte_are_not_flagged() {
        let report = check(
            "WITH recent AS (SELECT id FROM employees) \
             SELECT COUNT(*) AS total FROM recent ORDER BY total;",
        );
        assert!(report.ok(), "{:?}", report.errors);
    }

    #[test]
    fn test_insert_and_update_targets() {
        let report = check("INSERT INTO students (name, nickname) VALUES ('Ann', 'A');");
        assert_eq!(
            report.errors,
            vec![ValidationError::UnknownColumn {
                table: "students".to_string(),
                column: "nickname".to_string()
            }]
        );

        let report = check("UPDATE students SET surname = 'Lee' WHERE id = 3;");
        assert!(report.ok(), "{:?}", report.errors);
        assert!(report.profile.has_where);
        assert!(!report.profile.is_destructive());

        let report = check("UPDATE students SET grade = 'A';");
        assert!(!report.ok());
        assert!(report.profile.is_destructive());
    }

    #[test]
    fn test_unbalanced_input_is_error() {
        let report = check("SELECT * FROM employees WHERE name = 'Ann;");
        assert!(matches!(report.errors[0], ValidationError::Syntax { .. }));

        let report = check("SELECT COUNT(* FROM employees;");
        assert!(matches!(report.errors[0], ValidationError::Syntax { .. }));
        assert_eq!(report.profile.kind, StatementKind::Select);
    }

    #[test]
    fn test_statement_outside_closed_set_is_error() {
        let report = check("TRUNCATE TABLE students;");
        assert!(report.errors.contains(&ValidationError::UnsupportedStatement {
            keyword: "TRUNCATE".to_string()
        }));
        assert!(report.profile.is_destructive());

        let report = check("SHOW TABLES;");
        assert!(!report.ok());
    }

    #[test]
    fn test_delete_without_where() {
        let report = check("DELETE FROM students;");
        assert!(report.ok());
        assert_eq!(report.profile.kind, StatementKind::Delete);
        assert!(!report.profile.has_where);
        assert!(report.profile.is_destructive());
    }

    #[test]
    fn test_create_existing_table_warns() {
        let report = check("CREATE TABLE students (id INT);");
        assert!(report.ok());
        assert_eq!(report.warnings, vec!["table 'students' already exists"]);

        let report = check("CREATE TABLE pets (name VARCHAR(255), CHECK (name <> ''));");
        assert!(report.ok(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_cartesian_product_warns() {
        let report = check("SELECT students.name, employees.name FROM students, employees;");
        assert!(report.ok());
        assert!(report.warnings[0].contains("Cartesian"));
    }

    #[test]
    fn test_drop_and_alter_reference_existing_tables() {
        assert!(check("DROP TABLE students;").ok());
        assert!(!check("DROP TABLE pets;").ok());
        assert!(check("ALTER TABLE students ADD COLUMN email VARCHAR(80);").ok());
    }

    #[test]
    fn test_foreign_key_targets_must_exist() {
        let report = check(
            "CREATE TABLE enrolments (id INT, course_id INT REFERENCES courses(id));",
        );
        assert_eq!(
            report.errors,
            vec![ValidationError::UnknownTable {
                table: "courses".to_string()
            }]
        );

        let report = check(
            "CREATE TABLE enrolments (id INT, student_id INT, \
             FOREIGN KEY (student_id) REFERENCES offices(id));",
        );
        assert!(!report.ok());

        let report = check(
            "ALTER TABLE students ADD CONSTRAINT fk_course FOREIGN KEY (id) REFERENCES courses(id);",
        );
        assert!(report.errors.contains(&ValidationError::UnknownTable {
            table: "courses".to_string()
        }));

        let report = check("ALTER TABLE students ADD COLUMN office_id INT REFERENCES offices(id);");
        assert!(!report.ok());
    }

    #[test]
    fn test_foreign_keys_to_known_or_own_table_pass() {
        let report = check(
            "CREATE TABLE enrolments (id INT PRIMARY KEY, student_id INT REFERENCES students(id), \
             parent_id INT REFERENCES enrolments(id));",
        );
        assert!(report.ok(), "{:?}", report.errors);
        assert_eq!(report.tables, vec!["students"]);
    }

    #[test]
    fn test_derived_table_qualifier_is_silent() {
        let report = check(
            "SELECT t.total FROM (SELECT COUNT(*) AS total FROM employees) t;",
        );
        assert!(report.ok(), "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_normalized_rendering() {
        let report = check("select  name\n  from employees   where id=1");
        assert_eq!(
            report.normalized.as_deref(),
            Some("SELECT name FROM employees WHERE id = 1;")
        );
        assert!(check("SELECT * FROM").normalized.is_none());
    }

    #[test]
    fn test_postgres_schema_qualifier_is_ignored() {
        let report = validate(
            "SELECT s.name FROM public.students s WHERE s.id = 1;",
            &snapshot(),
            SqlDialect::Postgres,
        );
        assert!(report.ok(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }
}
