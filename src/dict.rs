//! Static EMV data dictionary (component C).
//!
//! Ported from `emv/protocol/data_elements.py`'s `ELEMENT_TABLE`, itself derived from
//! EMV 4.3 Book 3 Annex A and EMV 4.1 Book 1 Annex B.

/// How a tag's value should be interpreted once the TLV parser has sliced it out.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Parse {
    Bytes,
    Ascii,
    Dol,
    /// Decimal value encoded as BCD-in-hex.
    Dec,
    /// `[YY, MM, DD]` BCD digits.
    Date,
    /// Big-endian unsigned integer.
    Int,
    Country,
    Currency,
    TagList,
    Asrpd,
    CvmList,
    Auc,
}

pub struct DictEntry {
    pub tag: &'static [u8],
    pub name: &'static str,
    pub parse: Parse,
    pub alias: Option<&'static str>,
}

macro_rules! entry {
    ($tag:expr, $name:expr, $parse:expr, $alias:expr) => {
        DictEntry {
            tag: &$tag,
            name: $name,
            parse: $parse,
            alias: $alias,
        }
    };
}

pub static ELEMENT_TABLE: &[DictEntry] = &[
    entry!([0x42], "Issuer Identification Number", Parse::Bytes, Some("IIN")),
    entry!([0x46], "Pre-issuing data", Parse::Bytes, None),
    entry!([0x4F], "Application Dedicated File (ADF) Name", Parse::Bytes, Some("ADF_NAME")),
    entry!([0x50], "Application Label", Parse::Ascii, Some("APP_LABEL")),
    entry!([0x57], "Track 2 Equivalent Data", Parse::Bytes, Some("TRACK2")),
    entry!([0x5A], "Application Primary Account Number (PAN)", Parse::Dec, Some("PAN")),
    entry!([0x5E], "Proprietary Login Data", Parse::Bytes, None),
    entry!([0x5F, 0x20], "Cardholder Name", Parse::Ascii, None),
    entry!([0x5F, 0x24], "Application Expiration Date", Parse::Date, None),
    entry!([0x5F, 0x25], "Application Effective Date", Parse::Date, None),
    entry!([0x5F, 0x28], "Issuer Country Code", Parse::Country, None),
    entry!([0x5F, 0x2A], "Transaction Country Code", Parse::Country, None),
    entry!([0x5F, 0x2D], "Language Preference", Parse::Ascii, None),
    entry!([0x5F, 0x30], "Service Code", Parse::Bytes, None),
    entry!(
        [0x5F, 0x34],
        "Application Primary Account Number (PAN) Sequence Number",
        Parse::Int,
        Some("PAN_SN")
    ),
    entry!([0x5F, 0x36], "Transaction Currency Exponent", Parse::Bytes, None),
    entry!([0x5F, 0x50], "Issuer URL", Parse::Ascii, None),
    entry!(
        [0x5F, 0x53],
        "International Bank Account Number (IBAN)",
        Parse::Bytes,
        Some("IBAN")
    ),
    entry!([0x5F, 0x54], "Bank Identifier Code (BIC)", Parse::Bytes, Some("BIC")),
    entry!([0x5F, 0x55], "Issuer Country Code (alpha2 format)", Parse::Ascii, None),
    entry!([0x5F, 0x56], "Issuer Country Code (alpha3 format)", Parse::Ascii, None),
    entry!([0x5F, 0x57], "Account Type", Parse::Bytes, None),
    entry!([0x61], "Application Template", Parse::Bytes, Some("APP")),
    entry!([0x6F], "FCI Template", Parse::Bytes, Some("FCI")),
    entry!([0x70], "Read Record Response Template", Parse::Bytes, Some("RECORD")),
    entry!([0x71], "Issuer Script Template 1", Parse::Bytes, None),
    entry!([0x72], "Issuer Script Template 2", Parse::Bytes, None),
    entry!([0x73], "Directory Discretionary Template", Parse::Bytes, None),
    entry!([0x77], "Response Template Format 2", Parse::Bytes, Some("RMTF2")),
    entry!([0x80], "Response Template Format 1", Parse::Bytes, Some("RMTF1")),
    entry!([0x81], "Amount, Authorised (Binary)", Parse::Bytes, None),
    entry!([0x82], "Application Interchange Profile", Parse::Bytes, Some("AIP")),
    entry!([0x83], "Command Template", Parse::Bytes, None),
    entry!([0x84], "Dedicated File (DF) Name", Parse::Bytes, Some("DF")),
    entry!([0x86], "Issuer Script Command", Parse::Bytes, None),
    entry!([0x87], "Application Priority Indicator", Parse::Int, None),
    entry!([0x88], "Short File Identifier", Parse::Bytes, Some("SFI")),
    entry!([0x89], "Authorisation Code", Parse::Bytes, None),
    entry!([0x8A], "Authorisation Response Code", Parse::Bytes, None),
    entry!(
        [0x8C],
        "Card Risk Management Data Object List 1 (CDOL1)",
        Parse::Dol,
        Some("CDOL1")
    ),
    entry!(
        [0x8D],
        "Card Risk Management Data Object List 2 (CDOL2)",
        Parse::Dol,
        Some("CDOL2")
    ),
    entry!([0x8E], "Cardholder Verification Method (CVM) List", Parse::CvmList, None),
    entry!([0x8F], "Certification Authority Public Key Index", Parse::Bytes, None),
    entry!([0x90], "Issuer Public Key Certificate", Parse::Bytes, None),
    entry!([0x91], "Issuer Authentication Data", Parse::Bytes, None),
    entry!([0x92], "Issuer Public Key Remainder", Parse::Bytes, None),
    entry!([0x93], "Signed Static Application Data", Parse::Bytes, None),
    entry!([0x94], "Application File Locator", Parse::Bytes, Some("AFL")),
    entry!([0x95], "Terminal Verification Results", Parse::Bytes, None),
    entry!(
        [0x97],
        "Transaction Certificate Data Object List (TDOL)",
        Parse::Dol,
        Some("TDOL")
    ),
    entry!([0x98], "Transaction Certificate (TC) Hash Value", Parse::Bytes, None),
    entry!(
        [0x99],
        "Transaction Personal Identification Number (PIN) Data",
        Parse::Bytes,
        None
    ),
    entry!([0x9A], "Transaction Date", Parse::Date, None),
    entry!([0x9B], "Transaction Status Information", Parse::Bytes, None),
    entry!([0x9C], "Transaction Type", Parse::Bytes, None),
    entry!([0x9D], "DDF Name", Parse::Bytes, Some("DDF")),
    entry!([0xC8], "Card risk management country code", Parse::Country, None),
    entry!([0xC9], "Card risk management currency code", Parse::Currency, None),
    entry!([0x9F, 0x01], "Acquirer Identifier", Parse::Bytes, None),
    entry!([0x9F, 0x02], "Amount, Authorised", Parse::Bytes, None),
    entry!([0x9F, 0x03], "Amount, Other (Numeric)", Parse::Bytes, None),
    entry!([0x9F, 0x04], "Amount, Other (Binary)", Parse::Bytes, None),
    entry!([0x9F, 0x05], "Application Discretionary Data", Parse::Bytes, None),
    entry!([0x9F, 0x06], "Application Identifier (AID) - terminal", Parse::Bytes, None),
    entry!([0x9F, 0x07], "Application Usage Control", Parse::Auc, Some("AUC")),
    entry!([0x9F, 0x08], "Application Version Number", Parse::Bytes, None),
    entry!([0x9F, 0x09], "Application Version Number", Parse::Bytes, None),
    entry!(
        [0x9F, 0x0A],
        "Application Selection Registered Proprietary Data",
        Parse::Asrpd,
        None
    ),
    entry!([0x9F, 0x0B], "Cardholder Name Extended", Parse::Ascii, None),
    entry!([0x9F, 0x0D], "Issuer Action Code - Default", Parse::Bytes, None),
    entry!([0x9F, 0x0E], "Issuer Action Code - Denial", Parse::Bytes, None),
    entry!([0x9F, 0x0F], "Issuer Action Code - Online", Parse::Bytes, None),
    entry!([0x9F, 0x10], "Issuer Application Data", Parse::Bytes, Some("IAD")),
    entry!([0x9F, 0x11], "Issuer Code Table Index", Parse::Bytes, None),
    entry!([0x9F, 0x12], "Application Preferred Name", Parse::Ascii, None),
    entry!(
        [0x9F, 0x13],
        "Last Online Application Transaction Counter (ATC) Register",
        Parse::Int,
        None
    ),
    entry!([0x9F, 0x14], "Lower Consecutive Offline Limit", Parse::Bytes, None),
    entry!([0x9F, 0x15], "Merchant Category Code", Parse::Bytes, None),
    entry!([0x9F, 0x16], "Merchant Identifier", Parse::Bytes, None),
    entry!([0x9F, 0x17], "PIN Try Counter", Parse::Int, None),
    entry!([0x9F, 0x18], "Issuer Script Identifier", Parse::Bytes, None),
    entry!([0x9F, 0x1A], "Terminal Country Code", Parse::Country, None),
    entry!([0x9F, 0x1B], "Terminal Floor Limit", Parse::Bytes, None),
    entry!([0x9F, 0x1C], "Terminal Identification", Parse::Bytes, None),
    entry!([0x9F, 0x1D], "Terminal Risk Management Data", Parse::Bytes, None),
    entry!([0x9F, 0x1E], "Interface Device (IFD) Serial Number", Parse::Bytes, None),
    entry!([0x9F, 0x1F], "Track 1 Discretionary Data", Parse::Bytes, None),
    entry!([0x9F, 0x20], "Track 2 Discretionary Data", Parse::Bytes, None),
    entry!([0x9F, 0x21], "Transaction Time", Parse::Bytes, None),
    entry!([0x9F, 0x22], "Certification Authority Public Key Index", Parse::Bytes, None),
    entry!([0x9F, 0x23], "Upper Consecutive Offline Limit", Parse::Bytes, None),
    entry!([0x9F, 0x26], "Application Cryptogram", Parse::Bytes, Some("AC")),
    entry!([0x9F, 0x27], "Cryptogram Information Data", Parse::Bytes, Some("CID")),
    entry!([0x9F, 0x2D], "ICC PIN Encipherment Public Key Certificate", Parse::Bytes, None),
    entry!([0x9F, 0x2E], "ICC PIN Encipherment Public Key Exponent", Parse::Bytes, None),
    entry!([0x9F, 0x2F], "ICC PIN Encipherment Public Key Remainder", Parse::Bytes, None),
    entry!([0x9F, 0x32], "Issuer Public Key Exponent", Parse::Bytes, None),
    entry!([0x9F, 0x33], "Terminal Capabilities", Parse::Bytes, None),
    entry!([0x9F, 0x34], "Cardholder Verification Method (CVM) Results", Parse::Bytes, None),
    entry!([0x9F, 0x35], "Terminal Type", Parse::Bytes, None),
    entry!([0x9F, 0x36], "Application Transaction Counter", Parse::Int, Some("ATC")),
    entry!([0x9F, 0x37], "Unpredictable Number", Parse::Bytes, None),
    entry!(
        [0x9F, 0x38],
        "Processing Options Data Object List (PDOL)",
        Parse::Dol,
        Some("PDOL")
    ),
    entry!([0x9F, 0x39], "Point-of-Service (POS) Entry Mode", Parse::Bytes, None),
    entry!([0x9F, 0x3A], "Amount, Reference Currency", Parse::Bytes, None),
    entry!([0x9F, 0x3B], "Application Reference Currency", Parse::Bytes, None),
    entry!([0x9F, 0x3C], "Transaction Reference Currency Code", Parse::Bytes, None),
    entry!([0x9F, 0x3D], "Transaction Reference Currency Exponent", Parse::Bytes, None),
    entry!([0x9F, 0x40], "Additional Terminal Capabilities", Parse::Bytes, None),
    entry!([0x9F, 0x41], "Transaction Sequence Counter", Parse::Bytes, None),
    entry!([0x9F, 0x42], "Application Currency Code", Parse::Currency, None),
    entry!([0x9F, 0x43], "Application Reference Currency Exponent", Parse::Bytes, None),
    entry!([0x9F, 0x44], "Application Currency Exponent", Parse::Int, None),
    entry!([0x9F, 0x45], "Data Authentication Code", Parse::Bytes, None),
    entry!([0x9F, 0x46], "ICC Public Key Certificate", Parse::Bytes, None),
    entry!([0x9F, 0x47], "ICC Public Key Exponent", Parse::Bytes, None),
    entry!([0x9F, 0x48], "ICC Public Key Remainder", Parse::Bytes, None),
    entry!(
        [0x9F, 0x49],
        "Dynamic Data Authentication Data Object List (DDOL)",
        Parse::Dol,
        Some("DDOL")
    ),
    entry!([0x9F, 0x4A], "Static Data Authentication Tag List", Parse::TagList, None),
    entry!([0x9F, 0x4B], "Signed Dynamic Application Data", Parse::Bytes, None),
    entry!([0x9F, 0x4C], "ICC Dynamic Number", Parse::Bytes, None),
    entry!([0x9F, 0x4D], "Log Entry", Parse::Bytes, None),
    entry!([0x9F, 0x4E], "Merchant Name and Location", Parse::Bytes, None),
    entry!([0x9F, 0x4F], "Log Format", Parse::Bytes, None),
    entry!([0x9F, 0x55], "Issuer Authentication Flags", Parse::Bytes, Some("IAF")),
    entry!([0x9F, 0x56], "Issuer Proprietary Bitmap", Parse::Bytes, Some("IPB")),
    entry!(
        [0x9F, 0x5C],
        "Cumulative Total Transaction Amount Upper Limit",
        Parse::Int,
        Some("CTTAUL")
    ),
    entry!([0x9F, 0x5D], "Available Offline Spending Amount", Parse::Int, Some("AOSA")),
    entry!(
        [0x9F, 0x5E],
        "Consecutive Transaction International Upper Limit",
        Parse::Int,
        Some("CTIUL")
    ),
    entry!([0x9F, 0x6E], "Third Party Data", Parse::Bytes, None),
    entry!([0xA5], "FCI Proprietary Template", Parse::Bytes, Some("FCI_PROP")),
    entry!([0xBF, 0x0C], "FCI Issuer Discretionary Data", Parse::Bytes, None),
];

/// Tags which contain sensitive cardholder data, for redacted display.
/// Non-exhaustive — some issuers use their own proprietary tags for sensitive data.
pub static SENSITIVE_TAGS: &[&[u8]] = &[
    &[0x5A],       // PAN
    &[0x9F, 0x1F], // Track 1
    &[0x57],       // Track 2
    &[0x56],       // Mastercard prepaid: card number/expiry as ASCII
    &[0x9F, 0x6B], // Mastercard prepaid: card number as hex
];

/// European Payments Council product identifiers, keyed by the first byte of an
/// ASRPD entry under PDI `"0001"`.
pub fn epc_product_id(id: u8) -> &'static str {
    match id {
        1 => "Debit",
        2 => "Credit",
        3 => "Commercial",
        4 => "Pre-paid",
        _ => "Unknown",
    }
}

/// ISO 3166-1 numeric country codes, as used by tags 5F28/5F2A/9F1A/C8. Covers the
/// countries that actually show up in EMV test/production card data; an unrecognised
/// code falls back to its numeric form rather than failing.
static COUNTRY_CODES: &[(u16, &str)] = &[
    (8, "ALB"),
    (12, "DZA"),
    (32, "ARG"),
    (36, "AUS"),
    (40, "AUT"),
    (50, "BGD"),
    (56, "BEL"),
    (76, "BRA"),
    (100, "BGR"),
    (124, "CAN"),
    (156, "CHN"),
    (170, "COL"),
    (191, "HRV"),
    (196, "CYP"),
    (203, "CZE"),
    (208, "DNK"),
    (818, "EGY"),
    (233, "EST"),
    (246, "FIN"),
    (250, "FRA"),
    (276, "DEU"),
    (300, "GRC"),
    (344, "HKG"),
    (348, "HUN"),
    (356, "IND"),
    (360, "IDN"),
    (372, "IRL"),
    (376, "ISR"),
    (380, "ITA"),
    (392, "JPN"),
    (400, "JOR"),
    (410, "KOR"),
    (428, "LVA"),
    (440, "LTU"),
    (442, "LUX"),
    (458, "MYS"),
    (470, "MLT"),
    (484, "MEX"),
    (528, "NLD"),
    (554, "NZL"),
    (578, "NOR"),
    (586, "PAK"),
    (608, "PHL"),
    (616, "POL"),
    (620, "PRT"),
    (634, "QAT"),
    (642, "ROU"),
    (643, "RUS"),
    (682, "SAU"),
    (702, "SGP"),
    (703, "SVK"),
    (705, "SVN"),
    (710, "ZAF"),
    (724, "ESP"),
    (752, "SWE"),
    (756, "CHE"),
    (764, "THA"),
    (792, "TUR"),
    (784, "ARE"),
    (804, "UKR"),
    (826, "GBR"),
    (840, "USA"),
    (704, "VNM"),
];

/// ISO 4217 numeric currency codes, as used by tags 5F2A (via currency, not country, in
/// some contexts), C9 and 9F42.
static CURRENCY_CODES: &[(u16, &str)] = &[
    (8, "ALL"),
    (12, "DZD"),
    (32, "ARS"),
    (36, "AUD"),
    (44, "BSD"),
    (48, "BHD"),
    (50, "BDT"),
    (356, "INR"),
    (392, "JPY"),
    (124, "CAD"),
    (156, "CNY"),
    (170, "COP"),
    (191, "HRK"),
    (196, "EUR"), // Cyprus, euro since 2008
    (203, "CZK"),
    (208, "DKK"),
    (818, "EGP"),
    (978, "EUR"),
    (344, "HKD"),
    (348, "HUF"),
    (360, "IDR"),
    (376, "ILS"),
    (400, "JOD"),
    (410, "KRW"),
    (458, "MYR"),
    (484, "MXN"),
    (554, "NZD"),
    (578, "NOK"),
    (586, "PKR"),
    (608, "PHP"),
    (616, "PLN"),
    (634, "QAR"),
    (642, "RON"),
    (643, "RUB"),
    (682, "SAR"),
    (702, "SGD"),
    (710, "ZAR"),
    (752, "SEK"),
    (756, "CHF"),
    (764, "THB"),
    (949, "TRY"),
    (784, "AED"),
    (980, "UAH"),
    (826, "GBP"),
    (840, "USD"),
    (704, "VND"),
];

pub fn country_alpha3(code: u16) -> Option<&'static str> {
    COUNTRY_CODES.iter().find(|(c, _)| *c == code).map(|(_, a)| *a)
}

pub fn currency_alpha3(code: u16) -> Option<&'static str> {
    CURRENCY_CODES.iter().find(|(c, _)| *c == code).map(|(_, a)| *a)
}

pub fn lookup_tag(tag: &[u8]) -> Option<&'static DictEntry> {
    ELEMENT_TABLE.iter().find(|e| e.tag == tag)
}

pub fn lookup_alias(alias: &str) -> Option<&'static DictEntry> {
    ELEMENT_TABLE
        .iter()
        .find(|e| e.alias.map(|a| a.eq_ignore_ascii_case(alias)).unwrap_or(false))
}

pub fn is_sensitive(tag: &[u8]) -> bool {
    SENSITIVE_TAGS.iter().any(|t| *t == tag)
}
