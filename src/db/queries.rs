//! Audit table statements. `{table}` is replaced with the qualified table name.
//! Reads yield no rows while the table does not exist yet.

pub const AUDIT_TABLE: &str = "DEPLOYMENT_AUDIT";

pub const CREATE_AUDIT_TABLE: &str = r#"
IF OBJECT_ID(N'{table}', N'U') IS NULL
CREATE TABLE {table} (
    SCHEMA_NAME nvarchar(128) NOT NULL,
    OBJECT_NAME nvarchar(256) NOT NULL,
    CHANGE_NAME nvarchar(256) NOT NULL,
    CHANGE_TYPE nvarchar(64) NOT NULL,
    CHECKSUM nvarchar(64) NOT NULL,
    DEPLOYED_AT datetime2 NOT NULL,
    CONSTRAINT PK_DEPLOYMENT_AUDIT PRIMARY KEY (SCHEMA_NAME, CHANGE_TYPE, OBJECT_NAME, CHANGE_NAME)
)
"#;

pub const UPSERT_AUDIT_RECORD: &str = r#"
MERGE {table} AS target
USING (SELECT @P1 AS SCHEMA_NAME, @P2 AS OBJECT_NAME, @P3 AS CHANGE_NAME, @P4 AS CHANGE_TYPE) AS source
ON target.SCHEMA_NAME = source.SCHEMA_NAME
   AND target.CHANGE_TYPE = source.CHANGE_TYPE
   AND target.OBJECT_NAME = source.OBJECT_NAME
   AND target.CHANGE_NAME = source.CHANGE_NAME
WHEN MATCHED THEN
    UPDATE SET CHECKSUM = @P5, DEPLOYED_AT = @P6
WHEN NOT MATCHED THEN
    INSERT (SCHEMA_NAME, OBJECT_NAME, CHANGE_NAME, CHANGE_TYPE, CHECKSUM, DEPLOYED_AT)
    VALUES (@P1, @P2, @P3, @P4, @P5, @P6);
"#;

pub const LAST_CHECKSUM: &str = r#"
IF OBJECT_ID(N'{table}', N'U') IS NOT NULL
SELECT CHECKSUM FROM {table}
WHERE SCHEMA_NAME = @P1 AND CHANGE_TYPE = @P2 AND OBJECT_NAME = @P3 AND CHANGE_NAME = @P4
"#;

pub const LIST_DEPLOYED: &str = r#"
IF OBJECT_ID(N'{table}', N'U') IS NOT NULL
SELECT OBJECT_NAME, CHANGE_NAME, CHANGE_TYPE, CHECKSUM, DEPLOYED_AT
FROM {table}
WHERE SCHEMA_NAME = @P1
ORDER BY CHANGE_TYPE, OBJECT_NAME, CHANGE_NAME
"#;

pub const DELETE_AUDIT_RECORD: &str = r#"
DELETE FROM {table}
WHERE SCHEMA_NAME = @P1 AND CHANGE_TYPE = @P2 AND OBJECT_NAME = @P3 AND CHANGE_NAME = @P4
"#;

pub fn for_table(template: &str, table: &str) -> String {
    template.replace("{table}", table)
}
