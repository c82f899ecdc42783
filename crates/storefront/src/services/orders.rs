//! Order queries and back-office status changes.

use sqlx::PgPool;
use thiserror::Error;

use ryangel_core::{ClientId, OrderId, OrderStatus, PaymentStatus};

use crate::db::{OrderRepository, RepositoryError};
use crate::models::{DashboardStats, Order, OrderDetail};

/// Page size cap for order listings.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Unknown order, or not the caller's.
    #[error("order not found")]
    NotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

fn not_found(e: RepositoryError) -> OrderError {
    match e {
        RepositoryError::NotFound => OrderError::NotFound,
        other => OrderError::Repository(other),
    }
}

/// Order service.
pub struct OrderService<'a> {
    orders: OrderRepository<'a>,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            orders: OrderRepository::new(pool),
        }
    }

    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the database operation fails.
    pub async fn list_for_client(&self, client_id: ClientId) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_for_client(client_id).await?)
    }

    /// One of the shopper's own orders with its lines.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order is missing or belongs to
    /// someone else.
    pub async fn detail_for_client(
        &self,
        id: OrderId,
        client_id: ClientId,
    ) -> Result<OrderDetail, OrderError> {
        let order = self
            .orders
            .get_for_client(id, client_id)
            .await?
            .ok_or(OrderError::NotFound)?;
        self.with_lines(order).await
    }

    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the database operation fails.
    pub async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<Order>, OrderError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = offset.max(0);
        Ok(self.orders.list_all(limit, offset).await?)
    }

    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    pub async fn detail(&self, id: OrderId) -> Result<OrderDetail, OrderError> {
        let order = self
            .orders
            .get_by_id(id)
            .await?
            .ok_or(OrderError::NotFound)?;
        self.with_lines(order).await
    }

    async fn with_lines(&self, order: Order) -> Result<OrderDetail, OrderError> {
        let items = self.orders.items(order.id).await?;
        let payment_proofs = self.orders.payment_proofs(order.id).await?;
        Ok(OrderDetail {
            order,
            items,
            payment_proofs,
        })
    }

    /// Move an order to a new status. Milestone timestamps keep their first value.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let order = self.orders.update_status(id, status).await.map_err(not_found)?;
        tracing::info!(order_id = %id, status = %status, "Order status updated");
        Ok(order)
    }

    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<Order, OrderError> {
        let order = self
            .orders
            .update_payment_status(id, status)
            .await
            .map_err(not_found)?;
        tracing::info!(order_id = %id, payment_status = %status, "Payment status updated");
        Ok(order)
    }

    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the database operation fails.
    pub async fn dashboard(&self) -> Result<DashboardStats, OrderError> {
        Ok(self.orders.dashboard_stats().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_mapping() {
        assert!(matches!(
            not_found(RepositoryError::NotFound),
            OrderError::NotFound
        ));
        assert!(matches!(
            not_found(RepositoryError::DataCorruption("x".into())),
            OrderError::Repository(_)
        ));
    }
}
