use std::sync::Arc;

use affil_attribution::engine::{
    AttributionEngine, AttributionError, CreateConversionRequest, RefundOutcome,
};
use affil_commission::engine::{CommissionEngine, CommissionError};
use affil_commission::models::CommissionStatus;
use affil_core::money::prorate;
use affil_shared::models::events::{
    DeadLetterSink, OrderCancelledEvent, OrderConfirmedEvent, OrderCreatedEvent, OrderEvent,
    OrderRefundedEvent,
};
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Attribution(#[from] AttributionError),

    #[error(transparent)]
    Commission(#[from] CommissionError),
}

impl OrchestrationError {
    fn is_retryable(&self) -> bool {
        match self {
            OrchestrationError::Attribution(e) => e.is_retryable(),
            OrchestrationError::Commission(e) => e.is_retryable(),
        }
    }
}

/// Drives Attribution and Commission in response to order lifecycle events.
/// Each event is handled in isolation: terminal rejections are logged and
/// dropped, transient failures go to the dead-letter sink for redelivery, and
/// nothing is ever raised to the consumer loop.
pub struct EventOrchestrator {
    attribution: Arc<AttributionEngine>,
    commissions: Arc<CommissionEngine>,
    dead_letters: Arc<dyn DeadLetterSink>,
}

impl EventOrchestrator {
    pub fn new(
        attribution: Arc<AttributionEngine>,
        commissions: Arc<CommissionEngine>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self { attribution, commissions, dead_letters }
    }

    pub async fn handle(&self, event: OrderEvent) {
        let order_id = event.order_id().to_string();
        let result = match &event {
            OrderEvent::OrderCreated(e) => self.on_order_created(e).await,
            OrderEvent::OrderConfirmed(e) => self.on_order_confirmed(e).await,
            OrderEvent::OrderCancelled(e) => self.on_order_cancelled(e).await,
            OrderEvent::OrderRefunded(e) => self.on_order_refunded(e).await,
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_retryable() => {
                error!(order_id = %order_id, "Transient failure handling order event: {}", e);
                if let Err(push_err) = self.dead_letters.push(&event, &e.to_string()).await {
                    error!(order_id = %order_id, "Failed to dead-letter event: {}", push_err);
                }
            }
            Err(e) => {
                warn!(order_id = %order_id, "Order event rejected: {}", e);
            }
        }
    }

    /// Order created: no referral code means no attribution work at all.
    async fn on_order_created(&self, event: &OrderCreatedEvent) -> Result<(), OrchestrationError> {
        let referral_code = match &event.referral_code {
            Some(code) => code.clone(),
            None => return Ok(()),
        };

        let conversion = self
            .attribution
            .create_conversion(CreateConversionRequest {
                order_id: event.order_id.clone(),
                product_id: event.product_id,
                referral_code,
                order_amount_minor: event.order_amount_minor,
                product_price_minor: event.product_price_minor,
                quantity: event.quantity,
                currency: event.currency.clone(),
                customer_id: event.customer_id.clone(),
                is_new_customer: event.is_new_customer.unwrap_or(false),
            })
            .await?;

        info!(order_id = %event.order_id, conversion_id = %conversion.id, "Conversion recorded for order");
        Ok(())
    }

    /// Order confirmed: confirm each of the order's conversions and create
    /// its commission. Idempotent under redelivery because confirmation is a
    /// no-op on confirmed conversions and commission creation is unique per
    /// conversion.
    async fn on_order_confirmed(&self, event: &OrderConfirmedEvent) -> Result<(), OrchestrationError> {
        let conversions = self.attribution.conversions_for_order(&event.order_id).await?;

        for conversion in conversions {
            if conversion.is_terminal() {
                warn!(conversion_id = %conversion.id, status = ?conversion.status, "Skipping terminal conversion on order confirmation");
                continue;
            }
            let confirmed = self.attribution.confirm_conversion(conversion.id).await?;
            self.commissions.create_commission(confirmed.id).await?;
        }
        Ok(())
    }

    /// Order cancelled: cancel conversions and any commission not yet paid.
    async fn on_order_cancelled(&self, event: &OrderCancelledEvent) -> Result<(), OrchestrationError> {
        let reason = event
            .reason
            .clone()
            .unwrap_or_else(|| "order cancelled".to_string());
        let conversions = self.attribution.conversions_for_order(&event.order_id).await?;

        for conversion in conversions {
            if !conversion.is_terminal() {
                self.attribution.cancel_conversion(conversion.id).await?;
            }
            if let Some(commission) = self.commissions.find_by_conversion(conversion.id).await? {
                match commission.status {
                    CommissionStatus::Pending | CommissionStatus::Confirmed => {
                        self.commissions.cancel_commission(commission.id, reason.clone()).await?;
                    }
                    CommissionStatus::Paid => {
                        warn!(commission_id = %commission.id, "Commission already paid, cancellation skipped");
                    }
                    CommissionStatus::Cancelled => {}
                }
            }
        }
        Ok(())
    }

    /// Order refunded: full refunds cancel the commission, partial refunds
    /// prorate it against the surviving share of the order amount. The event
    /// carries the order's cumulative refunded total, so a redelivery
    /// reproduces the same proration and changes nothing.
    async fn on_order_refunded(&self, event: &OrderRefundedEvent) -> Result<(), OrchestrationError> {
        let conversions = self.attribution.conversions_for_order(&event.order_id).await?;

        for conversion in conversions {
            if conversion.is_terminal() {
                continue;
            }

            let outcome = self
                .attribution
                .process_refund(
                    conversion.id,
                    event.refund_amount_minor,
                    event.refund_quantity,
                    event.is_partial_refund,
                )
                .await?;

            let commission = match self.commissions.find_by_conversion(conversion.id).await? {
                Some(c) => c,
                None => continue, // refunded before confirmation, nothing earned yet
            };

            match outcome {
                RefundOutcome::Full(_) => {
                    if matches!(commission.status, CommissionStatus::Pending | CommissionStatus::Confirmed) {
                        self.commissions
                            .cancel_commission(commission.id, "order fully refunded".to_string())
                            .await?;
                    }
                }
                RefundOutcome::Partial(updated) => {
                    let new_amount = prorate(
                        commission.original_amount_minor,
                        updated.order_amount_minor,
                        updated.refunded_minor,
                    );
                    if new_amount != commission.amount_minor {
                        self.commissions
                            .adjust_commission(
                                commission.id,
                                new_amount,
                                format!("partial refund on order {}, refunded total {}", event.order_id, updated.refunded_minor),
                            )
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }
}
