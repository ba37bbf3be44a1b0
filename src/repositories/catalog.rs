use crate::models::catalog::Service;

use sqlx::PgPool;

#[derive(Clone)]
pub struct CatalogRepository {
    conn: PgPool,
}

impl CatalogRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn list_services(&self) -> Result<Vec<Service>, anyhow::Error> {
        let services = sqlx::query_as::<_, Service>("SELECT * FROM services ORDER BY price")
            .fetch_all(&self.conn)
            .await?;

        Ok(services)
    }

    pub async fn get_service(&self, service_id: &str) -> Result<Option<Service>, anyhow::Error> {
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = $1")
            .bind(service_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(service)
    }
}
