pub fn field_names_without_id(fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .filter(|x| **x != "id")
        .map(|x| x.to_string())
        .collect()
}
