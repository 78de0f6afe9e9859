//! Heuristic financial document classifier.
//!
//! Pure functions over filename, MIME type, and surrounding email text.
//! Scoring is multilingual keyword counting; confidence is relative to the
//! total score across all candidate types, capped below certainty.

use crate::defaults;
use crate::models::{DocumentType, JobType};

/// Classification outcome: a document type label and a confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub doc_type: DocumentType,
    pub confidence: f32,
}

/// Additional context for reclassification beyond filename and subject.
#[derive(Debug, Clone, Default)]
pub struct ReclassifyContext<'a> {
    pub filename: &'a str,
    pub mime_type: &'a str,
    pub email_subject: Option<&'a str>,
    pub body_text: Option<&'a str>,
    pub sender_domain: Option<&'a str>,
}

/// MIME types eligible for financial classification. Anything outside this
/// list is labelled `NonFinancial` immediately and never escalated for
/// extraction.
const DOCUMENT_MIME_ALLOW_LIST: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/tiff",
    "image/webp",
    "image/heic",
    "text/csv",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.oasis.opendocument.spreadsheet",
];

/// Multilingual keyword sets per candidate document type.
///
/// Keywords are matched as lowercase substrings of filename + subject.
const KEYWORD_SETS: &[(DocumentType, &[&str])] = &[
    (
        DocumentType::Invoice,
        &[
            "invoice", "rechnung", "facture", "factura", "fattura", "faktura", "bill",
        ],
    ),
    (
        DocumentType::Receipt,
        &[
            "receipt", "beleg", "quittung", "recu", "reçu", "recibo", "ricevuta", "kvitto",
        ],
    ),
    (
        DocumentType::Statement,
        &[
            "statement",
            "kontoauszug",
            "releve",
            "relevé",
            "extracto",
            "estratto",
        ],
    ),
    (
        DocumentType::Contract,
        &["contract", "vertrag", "contrat", "contrato", "agreement"],
    ),
    (
        DocumentType::Quote,
        &[
            "quote",
            "quotation",
            "angebot",
            "devis",
            "presupuesto",
            "offerta",
            "estimate",
        ],
    ),
    (
        DocumentType::DeliveryNote,
        &[
            "delivery note",
            "lieferschein",
            "bon de livraison",
            "albaran",
            "packing slip",
        ],
    ),
    (
        DocumentType::PaymentProof,
        &[
            "payment",
            "zahlung",
            "paiement",
            "pago",
            "remittance",
            "transfer confirmation",
        ],
    ),
    (
        DocumentType::TaxDocument,
        &["tax", "steuer", "impot", "impôt", "impuesto", "vat"],
    ),
];

/// Whether a MIME type is in the document allow-list.
pub fn is_document_mime(mime_type: &str) -> bool {
    let mime = mime_type
        .split(';')
        .next()
        .unwrap_or(mime_type)
        .trim()
        .to_lowercase();
    DOCUMENT_MIME_ALLOW_LIST.contains(&mime.as_str())
}

/// Classify an attachment from its filename, MIME type, and email subject.
pub fn classify(filename: &str, mime_type: &str, email_subject: Option<&str>) -> Classification {
    if !is_document_mime(mime_type) {
        return Classification {
            doc_type: DocumentType::NonFinancial,
            confidence: defaults::CLASSIFY_NON_FINANCIAL_CONFIDENCE,
        };
    }

    let mut text = filename.to_lowercase();
    if let Some(subject) = email_subject {
        text.push(' ');
        text.push_str(&subject.to_lowercase());
    }

    score_text(&text)
}

/// Score a prepared lowercase text blob against every keyword set.
fn score_text(text: &str) -> Classification {
    let mut best: Option<(DocumentType, u32)> = None;
    let mut total: u32 = 0;

    for (doc_type, keywords) in KEYWORD_SETS {
        let score = keywords.iter().filter(|kw| text.contains(**kw)).count() as u32;
        total += score;
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((*doc_type, score));
        }
    }

    match best {
        None => Classification {
            doc_type: DocumentType::Other,
            confidence: defaults::CLASSIFY_FALLBACK_CONFIDENCE,
        },
        Some((doc_type, top)) => {
            // Relative score: a filename matching many unrelated keyword
            // sets dilutes confidence in the winner.
            let confidence = (top as f32 / total as f32).min(defaults::CLASSIFY_CONFIDENCE_CAP);
            Classification {
                doc_type,
                confidence,
            }
        }
    }
}

/// Whether a classified attachment qualifies for downstream extraction.
pub fn should_extract(doc_type: DocumentType, confidence: f32) -> bool {
    if doc_type == DocumentType::NonFinancial {
        return false;
    }
    confidence >= extraction_threshold(doc_type)
}

/// Per-type minimum confidence required before routing to extraction.
pub fn extraction_threshold(doc_type: DocumentType) -> f32 {
    match doc_type {
        DocumentType::Invoice | DocumentType::Receipt | DocumentType::PaymentProof => {
            defaults::EXTRACT_THRESHOLD_PRIMARY
        }
        DocumentType::Statement
        | DocumentType::Quote
        | DocumentType::DeliveryNote
        | DocumentType::TaxDocument => defaults::EXTRACT_THRESHOLD_SECONDARY,
        DocumentType::Contract => defaults::EXTRACT_THRESHOLD_CONTRACT,
        DocumentType::Other => defaults::EXTRACT_THRESHOLD_OTHER,
        DocumentType::NonFinancial => defaults::EXTRACT_THRESHOLD_SECONDARY,
    }
}

/// Extraction queue for a document type, if any.
pub fn extractor_route(doc_type: DocumentType) -> Option<JobType> {
    match doc_type {
        DocumentType::Invoice
        | DocumentType::Statement
        | DocumentType::Quote
        | DocumentType::DeliveryNote => Some(JobType::ExtractInvoice),
        DocumentType::Receipt => Some(JobType::ExtractReceipt),
        _ => None,
    }
}

/// Recompute a classification with additional context.
///
/// The prior label is replaced only when the new confidence beats the old
/// one by more than a fixed margin, so weak evidence never overwrites an
/// established classification.
pub fn reclassify(current: Classification, ctx: &ReclassifyContext<'_>) -> Classification {
    if !is_document_mime(ctx.mime_type) {
        return current;
    }

    let mut text = ctx.filename.to_lowercase();
    for part in [ctx.email_subject, ctx.body_text, ctx.sender_domain]
        .into_iter()
        .flatten()
    {
        text.push(' ');
        text.push_str(&part.to_lowercase());
    }

    let fresh = score_text(&text);
    if fresh.confidence > current.confidence + defaults::RECLASSIFY_MARGIN {
        fresh
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_financial_mime_short_circuits() {
        let c = classify("invoice_march.zip", "application/zip", None);
        assert_eq!(c.doc_type, DocumentType::NonFinancial);
        assert_eq!(c.confidence, 0.9);
    }

    #[test]
    fn test_non_financial_confidence_independent_of_filename() {
        for name in ["invoice.exe", "receipt.mp3", "statement.html", "x"] {
            let c = classify(name, "text/html", None);
            assert_eq!(c.doc_type, DocumentType::NonFinancial);
            assert_eq!(c.confidence, 0.9, "filename {} changed the confidence", name);
        }
    }

    #[test]
    fn test_invoice_pdf() {
        let c = classify("invoice_march.pdf", "application/pdf", None);
        assert_eq!(c.doc_type, DocumentType::Invoice);
        assert!(c.confidence >= 0.6);
    }

    #[test]
    fn test_multilingual_keywords() {
        let rechnung = classify("rechnung-2024-07.pdf", "application/pdf", None);
        assert_eq!(rechnung.doc_type, DocumentType::Invoice);

        let facture = classify("facture_clients.pdf", "application/pdf", None);
        assert_eq!(facture.doc_type, DocumentType::Invoice);

        let beleg = classify("beleg_0815.png", "image/png", None);
        assert_eq!(beleg.doc_type, DocumentType::Receipt);

        let kontoauszug = classify("kontoauszug_januar.pdf", "application/pdf", None);
        assert_eq!(kontoauszug.doc_type, DocumentType::Statement);
    }

    #[test]
    fn test_subject_contributes_to_score() {
        let without = classify("scan0001.pdf", "application/pdf", None);
        assert_eq!(without.doc_type, DocumentType::Other);

        let with = classify("scan0001.pdf", "application/pdf", Some("Your invoice for July"));
        assert_eq!(with.doc_type, DocumentType::Invoice);
    }

    #[test]
    fn test_photo_png_is_unclassified_but_allowed_mime() {
        // PNG is in the allow-list, so it goes through keyword scoring and
        // falls back to Other with 0.5 when nothing matches.
        let c = classify("photo.png", "image/png", None);
        assert_eq!(c.doc_type, DocumentType::Other);
        assert_eq!(c.confidence, 0.5);
        // Other has no extraction queue, so it is never escalated.
        assert_eq!(extractor_route(c.doc_type), None);
    }

    #[test]
    fn test_confidence_always_in_unit_interval() {
        let cases = [
            ("invoice_invoice_rechnung_facture.pdf", "application/pdf"),
            ("payment_receipt_statement_tax.pdf", "application/pdf"),
            ("x.bin", "application/octet-stream"),
            ("", "application/pdf"),
            ("photo.png", "image/png"),
        ];
        for (name, mime) in cases {
            let c = classify(name, mime, Some("invoice receipt statement"));
            assert!(
                (0.0..=1.0).contains(&c.confidence),
                "{} -> {}",
                name,
                c.confidence
            );
        }
    }

    #[test]
    fn test_confidence_capped_below_certainty() {
        let c = classify("invoice_rechnung_facture_factura.pdf", "application/pdf", None);
        assert_eq!(c.doc_type, DocumentType::Invoice);
        assert!(c.confidence <= 0.95);
    }

    #[test]
    fn test_mixed_keywords_dilute_confidence() {
        let pure = classify("invoice.pdf", "application/pdf", None);
        let mixed = classify("invoice_receipt_statement.pdf", "application/pdf", None);
        assert!(mixed.confidence < pure.confidence);
    }

    #[test]
    fn test_should_extract_non_financial_never() {
        for confidence in [0.0, 0.3, 0.6, 0.9, 1.0] {
            assert!(!should_extract(DocumentType::NonFinancial, confidence));
        }
    }

    #[test]
    fn test_should_extract_thresholds() {
        assert!(should_extract(DocumentType::Invoice, 0.6));
        assert!(!should_extract(DocumentType::Invoice, 0.59));
        assert!(should_extract(DocumentType::Statement, 0.7));
        assert!(!should_extract(DocumentType::Statement, 0.69));
        assert!(should_extract(DocumentType::Contract, 0.8));
        assert!(!should_extract(DocumentType::Contract, 0.79));
        assert!(should_extract(DocumentType::Other, 0.5));
        assert!(!should_extract(DocumentType::Other, 0.49));
    }

    #[test]
    fn test_extractor_routes() {
        assert_eq!(
            extractor_route(DocumentType::Invoice),
            Some(JobType::ExtractInvoice)
        );
        assert_eq!(
            extractor_route(DocumentType::Statement),
            Some(JobType::ExtractInvoice)
        );
        assert_eq!(
            extractor_route(DocumentType::Quote),
            Some(JobType::ExtractInvoice)
        );
        assert_eq!(
            extractor_route(DocumentType::DeliveryNote),
            Some(JobType::ExtractInvoice)
        );
        assert_eq!(
            extractor_route(DocumentType::Receipt),
            Some(JobType::ExtractReceipt)
        );
        assert_eq!(extractor_route(DocumentType::Contract), None);
        assert_eq!(extractor_route(DocumentType::Other), None);
        assert_eq!(extractor_route(DocumentType::NonFinancial), None);
    }

    #[test]
    fn test_reclassify_requires_margin() {
        let current = Classification {
            doc_type: DocumentType::Other,
            confidence: 0.5,
        };
        // New evidence scoring barely above the old confidence is ignored.
        let ctx = ReclassifyContext {
            filename: "scan.pdf",
            mime_type: "application/pdf",
            email_subject: None,
            body_text: Some("please see the statement and the invoice"),
            sender_domain: None,
        };
        // Two sets score 1 each: top/total = 0.5, not > 0.5 + 0.1.
        let kept = reclassify(current, &ctx);
        assert_eq!(kept.doc_type, DocumentType::Other);

        // Strong single-type evidence replaces the label.
        let ctx = ReclassifyContext {
            filename: "scan.pdf",
            mime_type: "application/pdf",
            email_subject: Some("Rechnung"),
            body_text: Some("your invoice facture attached"),
            sender_domain: Some("billing.example.com"),
        };
        let replaced = reclassify(current, &ctx);
        assert_eq!(replaced.doc_type, DocumentType::Invoice);
        assert!(replaced.confidence > 0.6);
    }

    #[test]
    fn test_reclassify_keeps_label_on_disallowed_mime() {
        let current = Classification {
            doc_type: DocumentType::Invoice,
            confidence: 0.8,
        };
        let ctx = ReclassifyContext {
            filename: "invoice.html",
            mime_type: "text/html",
            email_subject: Some("invoice invoice invoice"),
            ..Default::default()
        };
        assert_eq!(reclassify(current, &ctx), current);
    }

    #[test]
    fn test_mime_allow_list_handles_parameters() {
        assert!(is_document_mime("application/pdf"));
        assert!(is_document_mime("Application/PDF"));
        assert!(is_document_mime("text/csv; charset=utf-8"));
        assert!(!is_document_mime("text/html"));
        assert!(!is_document_mime("application/octet-stream"));
    }
}
