/// Converts a configuration key into an environment variable name.
///
/// ASCII letters are upper-cased and every character outside of
/// `[A-Z0-9_]` is replaced with an underscore, so that `db.url`, `db-url` and
/// `DB_URL` all end up as the same merge key.
///
/// ```
/// use stackable_manifest::env::env_var_name;
///
/// assert_eq!(env_var_name("quarkus.datasource.jdbc-url"), "QUARKUS_DATASOURCE_JDBC_URL");
/// ```
pub fn env_var_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c.to_ascii_uppercase() {
            c @ ('A'..='Z' | '0'..='9' | '_') => c,
            _ => '_',
        })
        .collect()
}
