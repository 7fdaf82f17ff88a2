//! SOQL query builder.
//!
//! Builds `SELECT <columns> FROM <table> [WHERE ..] [ORDER BY ..] [LIMIT ..]`
//! text from a structured [`Query`]. Predicates are AND-combined; there is
//! no OR support and no parameter binding. Values are rendered verbatim, so
//! callers must only pass internal ids, enum values or pre-validated input.

use std::fmt;

/// Primary-key column present on every table.
pub const PRIMARY_KEY: &str = "Id";

/// Column sentinel selecting every standard field.
pub const ALL_FIELDS: &str = "Fields(standard)";

/// Table names.
pub mod tables {
    pub const USER: &str = "User";
    pub const USER_ROLE: &str = "UserRole";
    pub const USER_LOGIN: &str = "UserLogin";
    pub const USER_LICENSE: &str = "UserLicense";
    pub const PROFILE: &str = "Profile";
    pub const GROUP: &str = "Group";
    pub const GROUP_MEMBER: &str = "GroupMember";
    pub const PERMISSION_SET: &str = "PermissionSet";
    pub const PERMISSION_SET_ASSIGNMENT: &str = "PermissionSetAssignment";
    pub const PERMISSION_SET_GROUP: &str = "PermissionSetGroup";
    pub const PERMISSION_SET_GROUP_COMPONENT: &str = "PermissionSetGroupComponent";
    pub const CONNECTED_APPLICATION: &str = "ConnectedApplication";
}

/// Registered default columns for a table, in output order.
///
/// Tables without a registration select [`ALL_FIELDS`].
pub fn default_columns(table: &str) -> &'static [&'static str] {
    match table {
        tables::USER => &[
            "FirstName",
            "LastName",
            "Email",
            "Username",
            "IsActive",
            "UserType",
            "ProfileId",
            "UserRoleId",
            "LastLoginDate",
        ],
        tables::USER_ROLE => &["Name"],
        tables::USER_LOGIN => &["UserId", "IsFrozen", "IsPasswordLocked"],
        tables::USER_LICENSE => &["Name"],
        tables::PROFILE => &["Name", "UserLicenseId"],
        tables::GROUP => &["Name", "DeveloperName", "Type", "RelatedId", "Related.Name"],
        tables::GROUP_MEMBER => &["GroupId", "UserOrGroupId"],
        tables::PERMISSION_SET => &["Name", "Label", "Type", "ProfileId", "Profile.Name"],
        tables::PERMISSION_SET_ASSIGNMENT => &["PermissionSetId", "AssigneeId", "IsActive"],
        tables::PERMISSION_SET_GROUP => &[
            "Description",
            "DeveloperName",
            "HasActivationRequired",
            "IsDeleted",
            "Language",
            "MasterLabel",
            "NamespacePrefix",
        ],
        tables::PERMISSION_SET_GROUP_COMPONENT => {
            &["PermissionSetGroupId", "PermissionSetId", "IsDeleted"]
        }
        tables::CONNECTED_APPLICATION => {
            &["Name", "CreatedById", "CreatedDate", "LastModifiedDate"]
        }
        _ => &[],
    }
}

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    LessThan,
}

impl Operator {
    fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::LessThan => "<",
        }
    }
}

/// A single WHERE predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Compare {
        field: String,
        op: Operator,
        value: String,
    },
    InSubquery {
        field: String,
        subquery: Box<Query>,
    },
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { field, op, value } => {
                write!(f, "{} {} '{}'", field, op.as_str(), value)
            }
            Predicate::InSubquery { field, subquery } => write!(f, "{field} IN ({subquery})"),
        }
    }
}

/// A structured SOQL query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    columns: Vec<String>,
    predicates: Vec<Predicate>,
    order_by: Option<String>,
    limit: Option<u32>,
}

impl Query {
    /// Query a table with its registered default columns.
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        let columns = default_columns(&table)
            .iter()
            .map(|c| (*c).to_string())
            .collect();
        Self {
            table,
            columns,
            predicates: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Query a table with caller-supplied columns.
    ///
    /// An empty list falls back to the table's default columns.
    pub fn with_columns<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut query = Self::new(table);
        if !columns.is_empty() {
            query.columns = columns;
        }
        query
    }

    fn compare(mut self, field: impl Into<String>, op: Operator, value: impl Into<String>) -> Self {
        self.predicates.push(Predicate::Compare {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.compare(field, Operator::Eq, value)
    }

    pub fn where_not_eq(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.compare(field, Operator::NotEq, value)
    }

    pub fn where_less_than(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.compare(field, Operator::LessThan, value)
    }

    /// Restrict `field` to the values selected by `subquery`.
    pub fn where_in(mut self, field: impl Into<String>, subquery: Query) -> Self {
        self.predicates.push(Predicate::InSubquery {
            field: field.into(),
            subquery: Box::new(subquery),
        });
        self
    }

    /// Last call wins.
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    /// Last call wins. A zero limit is not rendered.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Requested columns, without the implicit primary key.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn order_by_field(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    /// Rendered column list with the primary key appended exactly once.
    pub fn selectors(&self) -> String {
        if self.columns.is_empty() {
            return ALL_FIELDS.to_string();
        }
        let mut selected: Vec<&str> = self
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| *c != PRIMARY_KEY)
            .collect();
        selected.push(PRIMARY_KEY);
        selected.join(",")
    }

    /// WHERE clause body, used for error context.
    pub fn criteria(&self) -> String {
        self.predicates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT {} FROM {}", self.selectors(), self.table)?;
        if !self.predicates.is_empty() {
            write!(f, " WHERE {}", self.criteria())?;
        }
        if let Some(field) = &self.order_by {
            write!(f, " ORDER BY {field}")?;
        }
        if let Some(limit) = self.limit.filter(|n| *n > 0) {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}
