mod common;

use common::{Call, MockDriver};
use pgmapper::{
    Field, FromInstance, Instance, ModelDef, ModelHandle, OnDelete, OrmError, OrmResult, Schema,
    SearchCondition, Value,
};
use std::sync::Arc;
use std::time::Duration;

fn schema() -> Arc<Schema> {
    Schema::builder()
        .model(
            ModelDef::new("Customer")
                .field(Field::text("name"))
                .field(Field::integer("age").null()),
        )
        .model(
            ModelDef::new("Order")
                .field(Field::foreign_key("customer", "Customer").on_delete(OnDelete::Cascade))
                .field(Field::integer("total")),
        )
        .build()
        .unwrap()
}

fn customers() -> ModelHandle {
    schema().handle("Customer").unwrap()
}

fn orders() -> ModelHandle {
    schema().handle("Order").unwrap()
}

const CUSTOMER_COLUMNS: &[&str] = &["id", "name", "age"];

fn customer_row(id: i64, name: &str, age: Option<i32>) -> Vec<Value> {
    vec![Value::Int(id), Value::from(name), Value::from(age)]
}

#[tokio::test]
async fn get_with_zero_rows_is_not_found() {
    let driver = MockDriver::new();
    driver.push_rows(CUSTOMER_COLUMNS, vec![]);

    let err = customers()
        .get(&driver, [("name", "Nobody")])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("customers"));
}

#[tokio::test]
async fn get_with_two_rows_is_multiple_results() {
    let driver = MockDriver::new();
    driver.push_rows(
        CUSTOMER_COLUMNS,
        vec![
            customer_row(1, "Ada", None),
            customer_row(2, "Ada", Some(30)),
        ],
    );

    let err = customers().get(&driver, [("name", "Ada")]).await.unwrap_err();
    match err {
        OrmError::MultipleResults { table, got } => {
            assert_eq!(table, "customers");
            assert_eq!(got, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn get_with_one_row_returns_instance() {
    let driver = MockDriver::new();
    driver.push_rows(CUSTOMER_COLUMNS, vec![customer_row(7, "Grace", Some(85))]);

    let grace = customers()
        .filter([("age__gte", 80)])
        .get(&driver)
        .await
        .unwrap();
    assert_eq!(grace.pk(), &Value::Int(7));
    assert_eq!(grace.try_get::<String>("name").unwrap(), "Grace");
    assert_eq!(grace.try_get::<Option<i32>>("age").unwrap(), Some(85));

    assert_eq!(
        driver.calls(),
        vec![
            Call::Acquire,
            Call::Fetch {
                sql: "SELECT customers.id, customers.name, customers.age FROM customers \
                      WHERE (customers.age >= $1)"
                    .to_string(),
                params: vec![Value::Int(80)],
            },
        ]
    );
}

#[tokio::test]
async fn create_then_get_round_trip() {
    let driver = MockDriver::new();
    driver.push_rows(CUSTOMER_COLUMNS, vec![customer_row(42, "Ada", None)]);

    let created = customers().create(&driver, [("name", "Ada")]).await.unwrap();
    let id = created.try_get::<i64>("id").unwrap();
    assert_eq!(id, 42);

    driver.push_rows(CUSTOMER_COLUMNS, vec![customer_row(42, "Ada", None)]);
    let fetched = customers().get(&driver, [("id", id)]).await.unwrap();
    assert_eq!(fetched.try_get::<String>("name").unwrap(), "Ada");
    assert_eq!(fetched.pk(), created.pk());

    let fetches = driver.fetches();
    assert_eq!(
        fetches[0].0,
        "INSERT INTO customers (name) VALUES ($1) RETURNING id, name, age"
    );
    assert_eq!(fetches[0].1, vec![Value::from("Ada")]);
    assert!(fetches[1].0.ends_with("WHERE (customers.id = $1)"));
    assert_eq!(fetches[1].1, vec![Value::Int(42)]);
}

#[tokio::test]
async fn create_runs_in_a_transaction() {
    let driver = MockDriver::new();
    driver.push_rows(CUSTOMER_COLUMNS, vec![customer_row(1, "Ada", None)]);
    customers().create(&driver, [("name", "Ada")]).await.unwrap();

    let calls = driver.calls();
    assert_eq!(calls[0], Call::Acquire);
    assert_eq!(calls[1], Call::Begin);
    assert!(matches!(calls[2], Call::Fetch { .. }));
    assert_eq!(calls[3], Call::Commit);
    assert_eq!(calls.len(), 4);
}

#[tokio::test]
async fn create_without_values_uses_default_values() {
    let driver = MockDriver::new();
    driver.push_rows(&["id", "customer_id", "total"], vec![vec![
        Value::Int(1),
        Value::Int(1),
        Value::Int(0),
    ]]);

    orders()
        .create(&driver, Vec::<(&str, Value)>::new())
        .await
        .unwrap();

    let (sql, params) = &driver.fetches()[0];
    assert_eq!(
        sql,
        "INSERT INTO orders DEFAULT VALUES RETURNING id, customer_id, total"
    );
    assert!(params.is_empty());
    assert!(!sql.contains("()"));
}

#[tokio::test]
async fn create_with_unknown_field_never_reaches_driver() {
    let driver = MockDriver::new();
    let err = customers()
        .create(&driver, [("nickname", "Ada")])
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::UnknownField { .. }));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn unsupported_lookup_makes_no_driver_call() {
    let driver = MockDriver::new();
    let err = customers()
        .filter([("age__icontains", 5)])
        .all(&driver)
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::UnsupportedLookup { .. }));
    assert!(err.is_construction_error());
    assert!(driver.calls().is_empty());

    let err = customers()
        .filter([("age__icontains", 5)])
        .update(&driver, [("age", 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::UnsupportedLookup { .. }));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn prefetch_related_fails_before_driver() {
    let driver = MockDriver::new();
    let err = customers()
        .prefetch_related(["order_set"])
        .all(&driver)
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Unsupported(_)));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn shared_handle_does_not_leak_conditions_between_tasks() {
    let driver = MockDriver::new();
    let handle = customers();

    let a = {
        let handle = handle.clone();
        let driver = driver.clone();
        tokio::spawn(async move { handle.filter([("name", "Ada")]).all(&driver).await })
    };
    let b = {
        let handle = handle.clone();
        let driver = driver.clone();
        tokio::spawn(async move { handle.filter([("age__lt", 30)]).all(&driver).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let fetches = driver.fetches();
    assert_eq!(fetches.len(), 2);
    for (sql, params) in fetches {
        assert_eq!(params.len(), 1);
        let by_name = sql.ends_with("WHERE (customers.name = $1)");
        let by_age = sql.ends_with("WHERE (customers.age < $1)");
        assert!(by_name ^ by_age, "unexpected sql: {sql}");
    }

    driver.push_rows(CUSTOMER_COLUMNS, vec![]);
    handle.all(&driver).await.unwrap();
    let (sql, _) = driver.fetches().pop().unwrap();
    assert!(!sql.contains("WHERE"));
}

#[tokio::test]
async fn update_binds_set_values_after_filter_values() {
    let driver = MockDriver::new();
    driver.push_rows(
        CUSTOMER_COLUMNS,
        vec![customer_row(1, "Ada", Some(37)), customer_row(2, "Ada", Some(37))],
    );

    let updated = customers()
        .filter([("name", "Ada")])
        .update(&driver, [("age", 37)])
        .await
        .unwrap();
    assert_eq!(updated.len(), 2);

    let (sql, params) = &driver.fetches()[0];
    assert_eq!(
        sql,
        "UPDATE customers SET age = $2 WHERE (customers.name = $1) RETURNING id, name, age"
    );
    assert_eq!(params, &vec![Value::from("Ada"), Value::Int(37)]);
    assert_eq!(driver.calls().last(), Some(&Call::Commit));
}

#[tokio::test]
async fn update_through_join_uses_subquery() {
    let driver = MockDriver::new();
    orders()
        .filter([("customer__name", "Ada")])
        .update(&driver, [("total", 0)])
        .await
        .unwrap();

    let (sql, params) = &driver.fetches()[0];
    assert_eq!(
        sql,
        "UPDATE orders SET total = $2 WHERE orders.id IN (SELECT orders.id FROM orders \
         INNER JOIN customers ON customers.id = orders.customer_id \
         WHERE (customers.name = $1)) RETURNING id, customer_id, total"
    );
    assert_eq!(params.len(), 2);
}

#[tokio::test]
async fn update_without_fields_is_rejected() {
    let driver = MockDriver::new();
    let err = customers()
        .update(&driver, Vec::<(&str, Value)>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn failed_mutation_rolls_back_and_keeps_original_error() {
    let driver = MockDriver::new();
    driver.push_error(OrmError::UniqueViolation("customers_name_key: duplicate".into()));

    let err = customers()
        .create(&driver, [("name", "Ada")])
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
    assert_eq!(
        driver.calls().last(),
        Some(&Call::Rollback),
        "calls: {:?}",
        driver.calls()
    );
    assert!(!driver.calls().contains(&Call::Commit));
}

#[tokio::test]
async fn failed_rollback_keeps_original_error_and_abandons() {
    let driver = MockDriver::new();
    driver.fail_rollback();
    driver.push_error(OrmError::UniqueViolation("customers_name_key: dup".into()));

    let err = customers()
        .create(&driver, [("name", "Ada")])
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(), "{err}");
    assert!(err.is_driver_error());
    assert!(matches!(err, OrmError::UniqueViolation(ref m) if m == "customers_name_key: dup"));

    let calls = driver.calls();
    assert!(calls.contains(&Call::Rollback));
    assert_eq!(calls.last(), Some(&Call::Abandon));
    assert!(!calls.contains(&Call::Commit));
}

#[tokio::test]
async fn cancelled_mutation_abandons_connection() {
    let driver = MockDriver::new();
    driver.hang_fetch();

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        customers().filter([("id", 1)]).update(&driver, [("age", 2)]),
    )
    .await;
    assert!(result.is_err());

    let calls = driver.calls();
    assert!(calls.contains(&Call::Begin));
    assert_eq!(calls.last(), Some(&Call::Abandon));
    assert!(!calls.contains(&Call::Commit));
    assert!(!calls.contains(&Call::Rollback));
}

#[tokio::test]
async fn cancelled_begin_abandons_connection() {
    let driver = MockDriver::new();
    driver.hang_begin();

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        customers().create(&driver, [("name", "Ada")]),
    )
    .await;
    assert!(result.is_err());

    assert_eq!(
        driver.calls(),
        vec![Call::Acquire, Call::Begin, Call::Abandon]
    );
}

#[tokio::test]
async fn delete_returns_deleted_rows() {
    let driver = MockDriver::new();
    driver.push_rows(CUSTOMER_COLUMNS, vec![customer_row(3, "Bob", None)]);

    let deleted = customers()
        .exclude([SearchCondition::is_null("age", true)])
        .delete(&driver)
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(
        driver.fetches()[0].0,
        "DELETE FROM customers WHERE NOT (customers.age IS NULL) RETURNING id, name, age"
    );
}

#[tokio::test]
async fn delete_all_has_no_where() {
    let driver = MockDriver::new();
    customers().delete(&driver).await.unwrap();
    assert_eq!(
        driver.fetches()[0].0,
        "DELETE FROM customers RETURNING id, name, age"
    );
}

#[tokio::test]
async fn count_reads_first_column() {
    let driver = MockDriver::new();
    driver.push_rows(&["count"], vec![vec![Value::Int(5)]]);

    let n = customers()
        .filter([("age__gt", 18)])
        .count(&driver)
        .await
        .unwrap();
    assert_eq!(n, 5);
    assert_eq!(
        driver.fetches()[0].0,
        "SELECT COUNT(*) FROM customers WHERE (customers.age > $1)"
    );
    // Reads are not wrapped in a transaction.
    assert!(!driver.calls().contains(&Call::Begin));
}

#[tokio::test]
async fn select_related_nests_instances() {
    let driver = MockDriver::new();
    driver.push_rows(
        &[
            "orders_id",
            "orders_customer_id",
            "orders_total",
            "customers_id",
            "customers_name",
            "customers_age",
        ],
        vec![vec![
            Value::Int(10),
            Value::Int(1),
            Value::Int(99),
            Value::Int(1),
            Value::from("Ada"),
            Value::Null,
        ]],
    );

    let rows = orders()
        .select_related(["customer"])
        .all(&driver)
        .await
        .unwrap();
    let customer = rows[0].related("customer").unwrap();
    assert_eq!(customer.try_get::<String>("name").unwrap(), "Ada");
    assert_eq!(customer.get("age"), Some(&Value::Null));
    assert_eq!(rows[0].to_json()["customer"]["name"], "Ada");
}

#[tokio::test]
async fn short_row_is_a_decode_error() {
    let driver = MockDriver::new();
    driver.push_rows(&["id"], vec![vec![Value::Int(1)]]);
    let err = customers().all(&driver).await.unwrap_err();
    assert!(matches!(err, OrmError::Decode { .. }));
}

#[derive(Debug, PartialEq)]
struct Customer {
    id: i64,
    name: String,
    age: Option<i32>,
}

impl FromInstance for Customer {
    fn from_instance(instance: &Instance) -> OrmResult<Self> {
        Ok(Self {
            id: instance.try_get("id")?,
            name: instance.try_get("name")?,
            age: instance.try_get("age")?,
        })
    }
}

#[tokio::test]
async fn all_as_maps_into_structs() {
    let driver = MockDriver::new();
    driver.push_rows(
        CUSTOMER_COLUMNS,
        vec![customer_row(1, "Ada", Some(36)), customer_row(2, "Bob", None)],
    );

    let rows: Vec<Customer> = customers()
        .order_by(["name"])
        .all_as(&driver)
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![
            Customer { id: 1, name: "Ada".into(), age: Some(36) },
            Customer { id: 2, name: "Bob".into(), age: None },
        ]
    );
    assert!(driver.fetches()[0].0.ends_with("ORDER BY customers.name"));
}
