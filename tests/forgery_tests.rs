mod common;

use common::{course_order, harness, pay};
use enrollpay::domain::payment::PaymentStatus;
use enrollpay::error::PaymentError;
use rand::RngCore;

#[tokio::test]
async fn test_random_signatures_never_verify() {
    let h = harness();
    let mut rng = rand::thread_rng();

    for i in 0..32 {
        let user = format!("u{}", i);
        let issued = h.engine.issue_order(course_order(&user, "c1", 2999)).await.unwrap();
        let mut request = pay(&h, &issued).await;

        let mut forged = [0u8; 32];
        rng.fill_bytes(&mut forged);
        request.signature = hex::encode(forged);

        let result = h.engine.verify_payment(request).await;
        assert!(matches!(result, Err(PaymentError::SignatureInvalid { .. })));
        let payment = h.engine.payment(issued.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
    }
}

#[tokio::test]
async fn test_malformed_signature_is_rejected() {
    let h = harness();
    let issued = h.engine.issue_order(course_order("u1", "c1", 2999)).await.unwrap();
    let mut request = pay(&h, &issued).await;
    request.signature = "not-hex".to_string();

    let result = h.engine.verify_payment(request).await;
    assert!(matches!(result, Err(PaymentError::SignatureInvalid { .. })));
}

#[tokio::test]
async fn test_signature_for_other_order_is_rejected() {
    let h = harness();
    let first = h.engine.issue_order(course_order("u1", "c1", 2999)).await.unwrap();
    let second = h.engine.issue_order(course_order("u2", "c1", 2999)).await.unwrap();
    let paid_first = pay(&h, &first).await;
    let mut request = pay(&h, &second).await;
    request.signature = paid_first.signature;

    let result = h.engine.verify_payment(request).await;
    assert!(matches!(result, Err(PaymentError::SignatureInvalid { .. })));
    assert_eq!(
        h.engine.payment(second.payment_id).await.unwrap().unwrap().status,
        PaymentStatus::Failed
    );
}
