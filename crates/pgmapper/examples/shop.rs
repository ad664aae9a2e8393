//! Model registry, lookups and joins against a live database.
//!
//! Run with: `DATABASE_URL=postgres://... cargo run --example shop`

use pgmapper::{
    DatabaseConfig, Driver, Executor, Field, ModelDef, OnDelete, OrmResult, PgDriver, Schema,
    SearchCondition, Value, create_pool_from_config,
};

#[tokio::main]
async fn main() -> OrmResult<()> {
    let schema = Schema::builder()
        .model(
            ModelDef::new("Customer")
                .table("example_customers")
                .field(Field::varchar("name", 100)),
        )
        .model(
            ModelDef::new("Order")
                .table("example_orders")
                .field(Field::foreign_key("customer", "Customer").on_delete(OnDelete::Cascade))
                .field(Field::integer("total"))
                .field(Field::timestamptz("shipped_at").null()),
        )
        .build()?;
    let customers = schema.handle("Customer")?;
    let orders = schema.handle("Order")?;

    println!("=== Rendered SQL ===");
    let rendered = orders
        .filter([("customer__name", Value::from("Ada")), ("total__gte", Value::from(100))])
        .exclude([SearchCondition::is_null("shipped_at", true)])
        .select_related(["customer"])
        .order_by(["total"])
        .limit(10)
        .to_sql()?;
    println!("{}", rendered.sql);
    println!("params: {:?}", rendered.values);

    let config = match DatabaseConfig::from_env() {
        Ok(config) => config,
        Err(_) => {
            println!("\nDATABASE_URL is not set; skipping database round trip");
            return Ok(());
        }
    };
    let driver = PgDriver::new(create_pool_from_config(&config)?);

    let mut conn = driver.acquire().await?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS example_customers (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(100) NOT NULL
        )",
        &[],
    )
    .await?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS example_orders (
            id BIGSERIAL PRIMARY KEY,
            customer_id BIGINT NOT NULL REFERENCES example_customers(id) ON DELETE CASCADE,
            total INTEGER NOT NULL,
            shipped_at TIMESTAMPTZ
        )",
        &[],
    )
    .await?;

    println!("\n=== Create / get ===");
    let ada = customers.create(&driver, [("name", "Ada")]).await?;
    println!("created: {}", ada.to_json());
    let order = orders
        .create(
            &driver,
            [("customer", ada.pk().clone()), ("total", Value::from(120))],
        )
        .await?;
    println!("order:   {}", order.to_json());

    let with_customer = orders
        .filter([("customer__name", "Ada")])
        .select_related(["customer"])
        .get(&driver)
        .await?;
    println!("joined:  {}", with_customer.to_json());
    println!("count:   {}", orders.filter([("total__gt", 100)]).count(&driver).await?);

    conn.execute("DROP TABLE example_orders", &[]).await?;
    conn.execute("DROP TABLE example_customers", &[]).await?;
    Ok(())
}
