use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::actor::{Actor, ActorId};
use crate::domain::request::{DecisionOutcome, Draft, DraftInput, Request, Stage};
use crate::domain::signature::Signature;
use crate::errors::{ApplicationError, DomainError};
use crate::flows::{ActionKind, FlowTransitionError};

pub const PREVIEW_PO_NUMBER: &str = "-- PREVIEW --";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    RequisitionVoucher,
    PurchaseOrder,
    PurchaseOrderPreview,
}

impl DocumentKind {
    pub fn title(&self) -> &'static str {
        match self {
            Self::RequisitionVoucher => "REQUISITION VOUCHER",
            Self::PurchaseOrder => "PURCHASE ORDER",
            Self::PurchaseOrderPreview => "PURCHASE ORDER - PREVIEW",
        }
    }

    pub fn template_name(&self) -> &'static str {
        match self {
            Self::RequisitionVoucher => "requisition_voucher.html.tera",
            Self::PurchaseOrder | Self::PurchaseOrderPreview => "purchase_order.html.tera",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    pub address: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signatory {
    pub caption: String,
    pub name: String,
    /// `data:image/png;base64,...` ready to drop into an `<img src>`.
    pub signature_data_uri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherLine {
    pub index: usize,
    pub name: String,
    pub quantity: u32,
    pub unit: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub index: usize,
    pub description: String,
    pub unit: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSection {
    pub po_number: String,
    pub supplier: String,
    pub address: String,
    pub shipping_instructions: String,
    pub lines: Vec<OrderLine>,
    pub grand_total: Decimal,
}

/// Everything a template needs to lay out one document. Built from a request,
/// never written back to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSource {
    pub kind: DocumentKind,
    pub title: String,
    pub organization: Organization,
    pub reference: String,
    pub stage: Stage,
    pub requester_name: String,
    pub date: String,
    pub items: Vec<VoucherLine>,
    pub order: Option<OrderSection>,
    pub signatory: Option<Signatory>,
    /// Engineering "evaluated by" line; vouchers only.
    pub co_signatory: Option<Signatory>,
}

impl DocumentSource {
    /// Whose signature belongs on the document for the request's current stage.
    pub fn signer_of(request: &Request) -> Option<ActorId> {
        match (&request.draft, &request.decision) {
            (Some(draft), _) => Some(draft.drafted_by.clone()),
            (None, Some(decision)) => Some(decision.actor_id.clone()),
            (None, None) => None,
        }
    }

    /// Engineering co-signer of the voucher, while the voucher is the document.
    pub fn evaluator_of(request: &Request) -> Option<ActorId> {
        match (&request.draft, &request.evaluation) {
            (None, Some(evaluation)) => Some(evaluation.actor_id.clone()),
            _ => None,
        }
    }

    /// Requisition voucher before a draft exists, purchase order afterwards.
    pub fn for_request(
        request: &Request,
        organization: &Organization,
        signature: Option<&Signature>,
        evaluator_signature: Option<&Signature>,
    ) -> Self {
        match &request.draft {
            Some(draft) => Self::purchase_order(
                DocumentKind::PurchaseOrder,
                request,
                draft,
                organization,
                Some(signatory("Order Issued and Authorized", &draft.drafted_by_name, signature)),
            ),
            None => Self {
                kind: DocumentKind::RequisitionVoucher,
                title: DocumentKind::RequisitionVoucher.title().to_string(),
                organization: organization.clone(),
                reference: request.reference.clone(),
                stage: request.stage,
                requester_name: request.requester.name.clone(),
                date: display_date(request.created_at),
                items: voucher_lines(request),
                order: None,
                signatory: request.decision.as_ref().map(|decision| {
                    let caption = match decision.outcome {
                        DecisionOutcome::Approved => "Approved by",
                        DecisionOutcome::Rejected => "Rejected by",
                    };
                    signatory(caption, &decision.actor_name, signature)
                }),
                co_signatory: request.evaluation.as_ref().map(|evaluation| {
                    signatory("Evaluated by", &evaluation.actor_name, evaluator_signature)
                }),
            },
        }
    }

    /// Purchase order laid out from an unsaved payload. Totals are recomputed and
    /// the request is left untouched.
    pub fn purchase_order_preview(
        request: &Request,
        input: DraftInput,
        drafter: &Actor,
        organization: &Organization,
        at: DateTime<Utc>,
    ) -> Result<Self, ApplicationError> {
        if request.stage != Stage::Approved {
            return Err(DomainError::from(FlowTransitionError::NotAllowed {
                stage: request.stage,
                action: ActionKind::Draft,
            })
            .into());
        }
        let draft = Draft::compute(input, PREVIEW_PO_NUMBER, drafter, at)?;
        let mut source =
            Self::purchase_order(DocumentKind::PurchaseOrderPreview, request, &draft, organization, None);
        source.signatory = Some(Signatory {
            caption: "Order Issued and Authorized".to_string(),
            name: "__________________".to_string(),
            signature_data_uri: None,
        });
        Ok(source)
    }

    pub fn file_stem(&self) -> String {
        match (&self.kind, &self.order) {
            (DocumentKind::PurchaseOrder, Some(order)) => order.po_number.clone(),
            (DocumentKind::PurchaseOrderPreview, _) => format!("PO-preview-{}", self.reference),
            _ => format!("RV-{}", self.reference),
        }
    }

    fn purchase_order(
        kind: DocumentKind,
        request: &Request,
        draft: &Draft,
        organization: &Organization,
        signatory: Option<Signatory>,
    ) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            organization: organization.clone(),
            reference: request.reference.clone(),
            stage: request.stage,
            requester_name: request.requester.name.clone(),
            date: display_date(draft.drafted_at),
            items: voucher_lines(request),
            order: Some(OrderSection {
                po_number: draft.po_number.clone(),
                supplier: draft.supplier.clone(),
                address: draft.address.clone(),
                shipping_instructions: draft.shipping_instructions.clone(),
                lines: draft
                    .lines
                    .iter()
                    .enumerate()
                    .map(|(index, line)| OrderLine {
                        index: index + 1,
                        description: line.description.clone(),
                        unit: line.unit.clone(),
                        quantity: line.quantity,
                        unit_price: line.unit_price,
                        line_total: line.line_total,
                    })
                    .collect(),
                grand_total: draft.grand_total,
            }),
            signatory,
            co_signatory: None,
        }
    }
}

fn voucher_lines(request: &Request) -> Vec<VoucherLine> {
    request
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| VoucherLine {
            index: index + 1,
            name: item.name.clone(),
            quantity: item.quantity,
            unit: item.unit.clone(),
        })
        .collect()
}

fn signatory(caption: &str, name: &str, signature: Option<&Signature>) -> Signatory {
    Signatory {
        caption: caption.to_string(),
        name: name.to_string(),
        signature_data_uri: signature.map(|signature| {
            format!(
                "data:{};base64,{}",
                signature.content_type,
                base64::engine::general_purpose::STANDARD.encode(&signature.image)
            )
        }),
    }
}

fn display_date(at: DateTime<Utc>) -> String {
    at.format("%B %d, %Y").to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDocument {
    pub content_type: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(String),
    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("renderer did not answer within {0} seconds")]
    Timeout(u64),
    #[error("renderer unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RenderError> for ApplicationError {
    fn from(value: RenderError) -> Self {
        Self::RenderUnavailable(value.to_string())
    }
}

/// Boundary to whatever turns a document view model into bytes.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn render(&self, source: &DocumentSource) -> Result<RenderedDocument, RenderError>;
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::actor::Role;
    use crate::domain::request::{DraftLineInput, RequestItem};
    use crate::domain::signature::PNG_MAGIC;

    fn organization() -> Organization {
        Organization { name: "Central Warehouse".to_string(), address: "Dock Road 1".to_string() }
    }

    fn analyst() -> Actor {
        Actor::new("analyst-1", "Ben Analyst", Role::BudgetAnalyst)
    }

    fn request() -> Request {
        Request::submit(
            &Actor::new("staff-1", "Rosa", Role::WarehouseStaff),
            vec![RequestItem::new("Bolts", 10, "pcs")],
            "MRR-2026-0001",
            Utc::now(),
        )
    }

    fn draft_input() -> DraftInput {
        DraftInput {
            supplier: "Acme".to_string(),
            shipping_instructions: String::new(),
            address: "Dock Road 1".to_string(),
            lines: vec![DraftLineInput {
                description: "Bolts".to_string(),
                unit: None,
                quantity: 10,
                unit_price: Decimal::new(5, 0),
            }],
        }
    }

    #[test]
    fn submitted_request_renders_unsigned_voucher() {
        let source = DocumentSource::for_request(&request(), &organization(), None, None);
        assert_eq!(source.kind, DocumentKind::RequisitionVoucher);
        assert_eq!(source.items.len(), 1);
        assert!(source.signatory.is_none());
        assert!(source.co_signatory.is_none());
        assert_eq!(source.file_stem(), "RV-MRR-2026-0001");
    }

    #[test]
    fn approved_voucher_carries_approver_signature() {
        let mut request = request();
        request.record_decision(&analyst(), DecisionOutcome::Approved, Utc::now()).expect("approve");
        let mut image = PNG_MAGIC.to_vec();
        image.extend_from_slice(&[1, 2, 3]);
        let signature =
            Signature::png(analyst().id, image, Utc::now()).expect("valid signature");

        assert_eq!(DocumentSource::signer_of(&request), Some(analyst().id));
        let source = DocumentSource::for_request(&request, &organization(), Some(&signature), None);
        let signatory = source.signatory.expect("signatory present");
        assert_eq!(signatory.caption, "Approved by");
        assert_eq!(signatory.name, "Ben Analyst");
        assert!(signatory
            .signature_data_uri
            .is_some_and(|uri| uri.starts_with("data:image/png;base64,")));
    }

    #[test]
    fn evaluated_voucher_carries_engineering_co_signature() {
        let engineer = Actor::new("eng-1", "Ed Engineer", Role::Engineering);
        let mut request = request();
        request.record_evaluation(&engineer, Utc::now()).expect("evaluate");
        let signature =
            Signature::png(engineer.id.clone(), PNG_MAGIC.to_vec(), Utc::now()).expect("signature");

        assert_eq!(DocumentSource::evaluator_of(&request), Some(engineer.id.clone()));
        let source = DocumentSource::for_request(&request, &organization(), None, Some(&signature));
        assert!(source.signatory.is_none());
        let co_signatory = source.co_signatory.expect("engineering line present");
        assert_eq!(co_signatory.caption, "Evaluated by");
        assert_eq!(co_signatory.name, "Ed Engineer");
        assert!(co_signatory.signature_data_uri.is_some());

        request.record_decision(&analyst(), DecisionOutcome::Rejected, Utc::now()).expect("reject");
        let source = DocumentSource::for_request(&request, &organization(), None, None);
        assert_eq!(source.signatory.map(|line| line.caption), Some("Rejected by".to_string()));
        assert!(source.co_signatory.is_some_and(|line| line.signature_data_uri.is_none()));
    }

    #[test]
    fn preview_recomputes_totals_and_marks_number() {
        let mut request = request();
        request.record_decision(&analyst(), DecisionOutcome::Approved, Utc::now()).expect("approve");
        let before = request.clone();

        let source = DocumentSource::purchase_order_preview(
            &request,
            draft_input(),
            &analyst(),
            &organization(),
            Utc::now(),
        )
        .expect("preview builds");

        let order = source.order.expect("order section");
        assert_eq!(order.po_number, PREVIEW_PO_NUMBER);
        assert_eq!(order.grand_total, Decimal::new(50, 0));
        assert_eq!(source.kind, DocumentKind::PurchaseOrderPreview);
        assert_eq!(request, before);
    }

    #[test]
    fn preview_requires_an_approved_request() {
        let error = DocumentSource::purchase_order_preview(
            &request(),
            draft_input(),
            &analyst(),
            &organization(),
            Utc::now(),
        )
        .expect_err("submitted request cannot be previewed as PO");
        assert!(error.is_invalid_transition());
    }

    #[test]
    fn render_errors_surface_as_unavailable() {
        let error = ApplicationError::from(RenderError::Timeout(10));
        assert!(matches!(error, ApplicationError::RenderUnavailable(_)));
    }
}
