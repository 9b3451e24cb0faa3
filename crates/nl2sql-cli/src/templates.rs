pub const GITIGNORE: &str = r#"# nl2sql
results/
.nl2sql/
*.db-journal
"#;
