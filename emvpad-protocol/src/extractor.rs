//! Response classification and typed projections.
//!
//! Each result type is described by a field table: wire name, default and
//! a setter. One generic helper walks the table, so adding a field is a
//! one-line change.

use emvpad_domain::{
    CardReadResult, CardReplaceResult, RecurringResult, SaleResult, TerminalError,
};

use crate::document::ResponseDocument;
use crate::error::{ProtocolError, ProtocolResult};

/// `ResponseOrigin` of a busy response.
pub const BUSY_RESPONSE_ORIGIN: &str = "Client";
/// `DSIXReturnCode` reported when a transaction is already running.
pub const BUSY_RETURN_CODE: &str = "003002";
/// `DSIXReturnCode` reported when EMV parameters have not been downloaded.
pub const MISSING_PARAMETERS_CODE: &str = "000002";
/// Code used when the transport rejected a submission.
pub const TRANSPORT_FAILURE_CODE: &str = "TRANSPORT_FAILURE";
/// Code used when a request could not be built at submission time.
pub const REQUEST_REJECTED_CODE: &str = "REQUEST_REJECTED";
/// Code used when no response arrived in time.
pub const TIMEOUT_CODE: &str = "TIMEOUT";
/// Code used when a successful response lacks required card data.
pub const MALFORMED_RESPONSE_CODE: &str = "MALFORMED_RESPONSE";

const ERROR_STATUS: &str = "Error";

// =============================================================================
// Classification
// =============================================================================

/// Verdict derived from a response document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Terminal accepted the command; fields are available for projection
    Success(ResponseDocument),
    /// Terminal reported an error
    Error(TerminalError),
    /// Another transaction is still running on the terminal
    Busy,
}

/// True iff the document comes from the client side with the
/// "already running" return code.
pub fn is_busy(doc: &ResponseDocument) -> bool {
    doc.field("ResponseOrigin") == Some(BUSY_RESPONSE_ORIGIN)
        && doc.field("DSIXReturnCode") == Some(BUSY_RETURN_CODE)
}

/// Classify a response. Busy takes precedence, then `CmdStatus == "Error"`,
/// everything else is a success.
pub fn classify(doc: &ResponseDocument) -> Classification {
    if is_busy(doc) {
        Classification::Busy
    } else if doc.field("CmdStatus") == Some(ERROR_STATUS) {
        Classification::Error(extract_error(doc))
    } else {
        Classification::Success(doc.clone())
    }
}

/// Code and message of an error response. The message falls back to the
/// code when the terminal sent no text.
pub fn extract_error(doc: &ResponseDocument) -> TerminalError {
    let code = doc.field_or("DSIXReturnCode", "");
    let message = doc
        .non_empty("TextResponse")
        .map(str::to_string)
        .unwrap_or_else(|| code.clone());

    TerminalError::new(code, message)
}

// =============================================================================
// Field Tables
// =============================================================================

/// Wire name, default when absent, setter.
type FieldSpec<T> = (&'static str, &'static str, fn(&mut T, String));

const AMOUNT_DEFAULT: &str = "0.00";

const SALE_FIELDS: &[FieldSpec<SaleResult>] = &[
    ("ResponseOrigin", "", |r, v| r.response_origin = v),
    ("DSIXReturnCode", "", |r, v| r.dsix_return_code = v),
    ("CmdStatus", "", |r, v| r.cmd_status = v),
    ("TextResponse", "", |r, v| r.text_response = v),
    ("SequenceNo", "", |r, v| r.sequence_no = v),
    ("UserTrace", "", |r, v| r.user_trace = v),
    ("MerchantID", "", |r, v| r.merchant_id = v),
    ("AcctNo", "", |r, v| r.acct_no = v),
    ("CardType", "", |r, v| r.card_type = v),
    ("TranCode", "", |r, v| r.tran_code = v),
    ("AuthCode", "", |r, v| r.auth_code = v),
    ("CaptureStatus", "", |r, v| r.capture_status = v),
    ("RefNo", "", |r, v| r.ref_no = v),
    ("InvoiceNo", "", |r, v| r.invoice_no = v),
    ("Purchase", AMOUNT_DEFAULT, |r, v| r.amount.purchase = v),
    ("Gratuity", AMOUNT_DEFAULT, |r, v| r.amount.gratuity = v),
    ("Authorize", AMOUNT_DEFAULT, |r, v| r.amount.authorize = v),
    ("CashBack", AMOUNT_DEFAULT, |r, v| r.amount.cash_back = v),
    ("AcqRefData", "", |r, v| r.acq_ref_data = v),
    ("ProcessData", "", |r, v| r.process_data = v),
    ("RecordNo", "", |r, v| r.record_no = v),
    ("EntryMethod", "", |r, v| r.entry_method = v),
    ("Date", "", |r, v| r.date = v),
    ("Time", "", |r, v| r.time = v),
    ("ApplicationLabel", "", |r, v| r.application_label = v),
    ("AID", "", |r, v| r.aid = v),
    ("TVR", "", |r, v| r.tvr = v),
    ("IAD", "", |r, v| r.iad = v),
    ("TSI", "", |r, v| r.tsi = v),
    ("ARC", "", |r, v| r.arc = v),
    ("CVM", "", |r, v| r.cvm = v),
    ("PayAPI_Id", "", |r, v| r.pay_api_id = v),
];

const RECURRING_FIELDS: &[FieldSpec<RecurringResult>] = &[
    ("CardHolderID", "", |r, v| r.cardholder_id = v),
    ("CardholderName", "", |r, v| r.cardholder_name = v),
    ("RecurringData", "", |r, v| r.recurring_data = v),
];

const CARD_REPLACE_FIELDS: &[FieldSpec<CardReplaceResult>] = &[
    ("CardHolderID", "", |r, v| r.cardholder_id = v),
    ("CardholderName", "", |r, v| r.cardholder_name = v),
];

fn project<T: Default>(doc: &ResponseDocument, fields: &[FieldSpec<T>]) -> T {
    let mut out = T::default();
    for (name, default, assign) in fields {
        assign(&mut out, doc.field_or(name, default));
    }
    out
}

// =============================================================================
// Projections
// =============================================================================

/// Sale projection. Missing fields degrade to empty strings (`0.00` for amounts).
pub fn extract_sale(doc: &ResponseDocument) -> SaleResult {
    project(doc, SALE_FIELDS)
}

/// Recurring sale projection: the sale fields plus cardholder and recurring markers.
pub fn extract_recurring(doc: &ResponseDocument) -> RecurringResult {
    RecurringResult {
        sale: extract_sale(doc),
        ..project(doc, RECURRING_FIELDS)
    }
}

/// Card replacement (zero-auth) projection.
pub fn extract_card_replace(doc: &ResponseDocument) -> CardReplaceResult {
    CardReplaceResult {
        sale: extract_sale(doc),
        ..project(doc, CARD_REPLACE_FIELDS)
    }
}

/// Card read projection.
///
/// # Errors
/// Returns `ProtocolError::MalformedResponse` naming the first required field
/// that is absent or blank.
pub fn extract_card_read(doc: &ResponseDocument) -> ProtocolResult<CardReadResult> {
    let required = |name: &str| {
        doc.non_empty(name)
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::MalformedResponse(name.to_string()))
    };

    Ok(CardReadResult {
        exp_month: required("ExpDateMonth")?,
        exp_year: required("ExpDateYear")?,
        card_bin: required("CardBin")?,
        last4: required("Last4")?,
        cardholder_name: doc.non_empty("CardholderName").map(str::to_string),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> ResponseDocument {
        ResponseDocument::parse(&format!("<RStream>{}</RStream>", body))
    }

    const APPROVED_SALE: &str = "<CmdResponse>\
        <ResponseOrigin>Processor</ResponseOrigin>\
        <DSIXReturnCode>000000</DSIXReturnCode>\
        <CmdStatus>Approved</CmdStatus>\
        <TextResponse>APPROVED</TextResponse>\
        <SequenceNo>0010010012</SequenceNo>\
        <UserTrace>op7-0012</UserTrace>\
        </CmdResponse>\
        <TranResponse>\
        <MerchantID>MERCHANT01</MerchantID>\
        <AcctNo>************0060</AcctNo>\
        <CardType>M/C</CardType>\
        <TranCode>EMVSale</TranCode>\
        <AuthCode>30158P</AuthCode>\
        <CaptureStatus>Captured</CaptureStatus>\
        <RefNo>17000000000000012</RefNo>\
        <InvoiceNo>17000000000000012</InvoiceNo>\
        <Amount><Purchase>12.34</Purchase><Authorize>12.34</Authorize></Amount>\
        <RecordNo>RN-TOKEN</RecordNo>\
        <EntryMethod>CHIP</EntryMethod>\
        <AID>A0000000041010</AID>\
        <PayAPI_Id>PAY-1</PayAPI_Id>\
        </TranResponse>";

    #[test]
    fn test_busy_requires_client_origin_and_code() {
        assert!(is_busy(&doc(
            "<ResponseOrigin>Client</ResponseOrigin><DSIXReturnCode>003002</DSIXReturnCode>"
        )));
        assert!(!is_busy(&doc(
            "<ResponseOrigin>Processor</ResponseOrigin><DSIXReturnCode>003002</DSIXReturnCode>"
        )));
        assert!(!is_busy(&doc(
            "<ResponseOrigin>Client</ResponseOrigin><DSIXReturnCode>000002</DSIXReturnCode>"
        )));
    }

    #[test]
    fn test_busy_takes_precedence_over_error() {
        let busy = doc("<ResponseOrigin>Client</ResponseOrigin>\
            <DSIXReturnCode>003002</DSIXReturnCode><CmdStatus>Error</CmdStatus>");

        assert_eq!(classify(&busy), Classification::Busy);
    }

    #[test]
    fn test_classify_error() {
        let response = doc("<CmdStatus>Error</CmdStatus><DSIXReturnCode>000002</DSIXReturnCode>\
            <TextResponse>Parameters not downloaded</TextResponse>");

        assert_eq!(
            classify(&response),
            Classification::Error(TerminalError::new("000002", "Parameters not downloaded"))
        );
    }

    #[test]
    fn test_classify_is_idempotent() {
        for body in [APPROVED_SALE, "<CmdStatus>Error</CmdStatus>", "<Nothing/>"] {
            let response = doc(body);
            assert_eq!(classify(&response), classify(&response));
        }
    }

    #[test]
    fn test_anything_but_error_is_success() {
        assert!(matches!(classify(&doc("<CmdStatus>Declined</CmdStatus>")), Classification::Success(_)));
        assert!(matches!(classify(&doc("")), Classification::Success(_)));
    }

    #[test]
    fn test_error_message_falls_back_to_code() {
        let err = extract_error(&doc("<CmdStatus>Error</CmdStatus><DSIXReturnCode>001007</DSIXReturnCode>"));
        assert_eq!(err, TerminalError::new("001007", "001007"));
    }

    #[test]
    fn test_extract_sale() {
        let sale = extract_sale(&doc(APPROVED_SALE));

        assert_eq!(sale.cmd_status, "Approved");
        assert_eq!(sale.amount.purchase, "12.34");
        assert_eq!(sale.amount.authorize, "12.34");
        assert_eq!(sale.amount.gratuity, "0.00");
        assert_eq!(sale.acct_no, "************0060");
        assert_eq!(sale.record_no, "RN-TOKEN");
        assert_eq!(sale.aid, "A0000000041010");
        assert_eq!(sale.pay_api_id, "PAY-1");
        assert_eq!(sale.tvr, "");
    }

    #[test]
    fn test_extract_recurring_adds_cardholder_fields() {
        let body = format!(
            "{}<CardHolderID>CH-1</CardHolderID><CardholderName>DOE/JANE</CardholderName>\
             <RecurringData>Recurring</RecurringData>",
            APPROVED_SALE
        );
        let recurring = extract_recurring(&doc(&body));

        assert_eq!(recurring.sale.amount.purchase, "12.34");
        assert_eq!(recurring.cardholder_id, "CH-1");
        assert_eq!(recurring.cardholder_name, "DOE/JANE");
        assert_eq!(recurring.recurring_data, "Recurring");
    }

    #[test]
    fn test_extract_card_replace_degrades_to_empty() {
        let replace = extract_card_replace(&doc("<CmdStatus>Approved</CmdStatus>"));

        assert_eq!(replace.sale.cmd_status, "Approved");
        assert_eq!(replace.cardholder_id, "");
        assert_eq!(replace.sale.amount.purchase, "0.00");
    }

    #[test]
    fn test_extract_card_read() {
        let read = extract_card_read(&doc("<CardholderName>DOE/JANE</CardholderName>\
            <ExpDateMonth>12</ExpDateMonth><ExpDateYear>29</ExpDateYear>\
            <CardBin>541333</CardBin><Last4>0060</Last4>"))
        .unwrap();

        assert_eq!(read.cardholder_name.as_deref(), Some("DOE/JANE"));
        assert_eq!(read.exp_month, "12");
        assert_eq!(read.exp_year, "29");
        assert_eq!(read.card_bin, "541333");
        assert_eq!(read.last4, "0060");
    }

    #[test]
    fn test_card_read_name_is_optional() {
        let read = extract_card_read(&doc("<ExpDateMonth>12</ExpDateMonth><ExpDateYear>29</ExpDateYear>\
            <CardBin>541333</CardBin><Last4>0060</Last4>"))
        .unwrap();

        assert_eq!(read.cardholder_name, None);
    }

    #[test]
    fn test_card_read_missing_bin_is_malformed() {
        let err = extract_card_read(&doc("<ExpDateMonth>12</ExpDateMonth><ExpDateYear>29</ExpDateYear>\
            <Last4>0060</Last4>"))
        .unwrap_err();

        assert_eq!(err, ProtocolError::MalformedResponse("CardBin".to_string()));
    }

    #[test]
    fn test_card_read_blank_field_is_malformed() {
        let err = extract_card_read(&doc("<ExpDateMonth> </ExpDateMonth><ExpDateYear>29</ExpDateYear>\
            <CardBin>541333</CardBin><Last4>0060</Last4>"))
        .unwrap_err();

        assert_eq!(err, ProtocolError::MalformedResponse("ExpDateMonth".to_string()));
    }
}
