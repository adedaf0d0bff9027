use anyhow::Error;
use tokio_postgres::{types::ToSql, GenericClient, Row};

pub fn create_insert_sql(table: &str, id_field: &str, fields: &[String]) -> String {
    let fields_sql: String = fields
        .iter()
        .fold(id_field.to_string(), |acc, x| format!("{}, {}", acc, x));
    let field_range = 2..fields.len() + 2;
    let field_params = field_range.fold("$1".to_string(), |acc, x| format!("{}, ${}", acc, x));
    format!(
        "insert into {} ({}) values ({})",
        table, fields_sql, field_params
    )
}

pub fn create_delete_sql(table: &str, id_field: &str) -> String {
    format!("delete from {} where {} = $1", table, id_field)
}

pub async fn insert<C: GenericClient>(
    client: &C,
    table: &str,
    id_field: &str,
    fields: &[String],
    id_param: &(dyn ToSql + Sync),
    params: &[&(dyn ToSql + Sync)],
) -> Result<(), Error> {
    let insert_sql = create_insert_sql(table, id_field, fields);
    let stmt = client.prepare(&insert_sql).await?;
    let all_params = [&[id_param], params].concat();
    client.execute(&stmt, all_params.as_slice()).await?;
    Ok(())
}

pub async fn delete<C: GenericClient>(
    client: &C,
    table: &str,
    id_field: &str,
    id_param: &(dyn ToSql + Sync),
) -> Result<u64, Error> {
    let stmt = client.prepare(&create_delete_sql(table, id_field)).await?;
    Ok(client.execute(&stmt, &[id_param]).await?)
}

pub type Field = String;
pub type Value = dyn ToSql + Sync;

pub enum QueryCondition<'a> {
    Eq(Field, &'a Value),
    Neq(Field, &'a Value),
    Gt(Field, &'a Value),
    Gte(Field, &'a Value),
    Lt(Field, &'a Value),
    Lte(Field, &'a Value),
}

impl<'a> QueryCondition<'a> {
    fn param(&self) -> &'a Value {
        match self {
            QueryCondition::Eq(_, p)
            | QueryCondition::Neq(_, p)
            | QueryCondition::Gt(_, p)
            | QueryCondition::Gte(_, p)
            | QueryCondition::Lt(_, p)
            | QueryCondition::Lte(_, p) => *p,
        }
    }
}

pub fn query_cond_to_string(q_cond: &QueryCondition, n: usize) -> String {
    match q_cond {
        QueryCondition::Eq(f, _) => format!("{} = ${}", f, n),
        QueryCondition::Neq(f, _) => format!("{} != ${}", f, n),
        QueryCondition::Gt(f, _) => format!("{} > ${}", f, n),
        QueryCondition::Gte(f, _) => format!("{} >= ${}", f, n),
        QueryCondition::Lt(f, _) => format!("{} < ${}", f, n),
        QueryCondition::Lte(f, _) => format!("{} <= ${}", f, n),
    }
}

pub fn generate_select<'a>(
    table: &str,
    query_conditions: &[QueryCondition<'a>],
) -> (String, Vec<&'a Value>) {
    let base_query = format!("select * from {}", table);
    if query_conditions.is_empty() {
        (base_query, vec![])
    } else {
        let (where_part, _) = query_conditions
            .iter()
            .fold(("".to_string(), 1), |acc, x| {
                let (q, i) = acc;
                (format!("{} and {}", q, query_cond_to_string(x, i)), i + 1)
            });
        let query_with_where = format!("{} where 1 = 1{}", base_query, where_part);
        let params = query_conditions.iter().map(|x| x.param()).collect();
        (query_with_where, params)
    }
}

pub async fn select_all<C, F, A>(
    client: &C,
    table: &str,
    query_conditions: &[QueryCondition<'_>],
    from_row: F,
) -> Result<Vec<A>, Error>
where
    C: GenericClient,
    F: Fn(Row) -> Result<A, tokio_postgres::Error>,
{
    let (query, params) = generate_select(table, query_conditions);
    let stmt = client.prepare(&query).await?;
    let rows = client.query(&stmt, params.as_slice()).await?;
    Ok(rows
        .into_iter()
        .map(from_row)
        .collect::<Result<Vec<A>, _>>()?)
}

pub async fn select<C, F, A>(
    client: &C,
    table: &str,
    query_conditions: &[QueryCondition<'_>],
    from_row: F,
) -> Result<Option<A>, Error>
where
    C: GenericClient,
    F: Fn(Row) -> Result<A, tokio_postgres::Error>,
{
    let (query, params) = generate_select(table, query_conditions);
    let stmt = client.prepare(&query).await?;
    let row_opt = client.query_opt(&stmt, params.as_slice()).await?;
    Ok(row_opt.map(from_row).transpose()?)
}

macro_rules! entity {
    (
        $(#[$struct_meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident : $field_type:ty
            ),*$(,)?
    }) => {

        $(#[$struct_meta])*
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name : $field_type,
            )*
        }

        paste::paste! {
            #[derive(Debug)]
            pub enum [<$name Criteria>] {
                $([<$field_name:camel Eq>]($field_type)),*,
                $([<$field_name:camel Lte>]($field_type)),*,
            }

            impl [<$name Criteria>] {
                pub fn to_query_condition(&self) -> $crate::postgres_common::core::QueryCondition<'_> {
                    use $crate::postgres_common::core::QueryCondition;
                    match self {
                        $([<$name Criteria>]::[<$field_name:camel Eq>](x) => QueryCondition::Eq(stringify!($field_name).to_string(), x)),*,
                        $([<$name Criteria>]::[<$field_name:camel Lte>](x) => QueryCondition::Lte(stringify!($field_name).to_string(), x)),*,
                    }
                }
            }
        }

        impl $name {

            pub fn field_names() -> &'static [&'static str] {
                static NAMES: &[&str] = &[$(stringify!($field_name)),*];
                NAMES
            }

            pub fn from_row(row: tokio_postgres::Row) -> Result<$name, tokio_postgres::Error> {
                $(let $field_name: $field_type = row.try_get(stringify!($field_name))?;)*
                Ok($name {
                    $($field_name),*
                })
            }

            /// Column values in declaration order, without the leading id.
            pub fn to_params(&self) -> Vec<&(dyn tokio_postgres::types::ToSql + Sync)> {
                let all: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = vec![
                    $(&self.$field_name as &(dyn tokio_postgres::types::ToSql + Sync)),*
                ];
                all.into_iter().skip(1).collect()
            }
        }
    }
}

pub(crate) use entity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_sql_numbers_every_column() {
        let fields = vec!["key".to_string(), "uses_left".to_string()];
        assert_eq!(
            "insert into invitation_keys (id, key, uses_left) values ($1, $2, $3)",
            create_insert_sql("invitation_keys", "id", &fields)
        );
    }

    #[test]
    fn select_without_conditions_has_no_where() {
        let (query, params) = generate_select("invitation_users", &[]);
        assert_eq!("select * from invitation_users", query);
        assert!(params.is_empty());
    }

    #[test]
    fn select_numbers_conditions_in_order() {
        let token = "abc".to_string();
        let uses = 0i32;
        let conds = vec![
            QueryCondition::Eq("key".to_string(), &token),
            QueryCondition::Gt("uses_left".to_string(), &uses),
        ];
        let (query, params) = generate_select("invitation_keys", &conds);
        assert_eq!(
            "select * from invitation_keys where 1 = 1 and key = $1 and uses_left > $2",
            query
        );
        assert_eq!(2, params.len());
    }

    #[test]
    fn delete_sql_targets_id() {
        assert_eq!(
            "delete from invitation_keys where id = $1",
            create_delete_sql("invitation_keys", "id")
        );
    }
}
