//! CSS selectors for search-result and post pages

use lazy_static::lazy_static;
use scraper::Selector;

// Selectors are literals, so a parse failure is a programming error
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    // Search results
    pub(crate) static ref RESULT_LIST: Selector = parse_selector!("ul#search-results");
    pub(crate) static ref RESULT_ROW: Selector =
        parse_selector!("ul#search-results > li.result-row");
    pub(crate) static ref RESULT_INFO: Selector = parse_selector!("div.result-info");
    pub(crate) static ref RESULT_DATE: Selector = parse_selector!("time.result-date");
    pub(crate) static ref RESULT_HEADING_LINK: Selector = parse_selector!(".result-heading > a");
    pub(crate) static ref RESULT_PRICE: Selector = parse_selector!(".result-meta .result-price");
    pub(crate) static ref RESULT_HOUSING: Selector = parse_selector!(".result-meta .housing");
    pub(crate) static ref NEXT_PAGE: Selector = parse_selector!("a.button.next");

    // Post pages
    pub(crate) static ref POST_BODY: Selector = parse_selector!(".body");
    pub(crate) static ref POST_REMOVED: Selector = parse_selector!(".removed");
    pub(crate) static ref POST_PRICE: Selector = parse_selector!(".postingtitletext .price");
    pub(crate) static ref POST_HOUSING: Selector = parse_selector!(".postingtitletext .housing");
    pub(crate) static ref POST_TITLE: Selector =
        parse_selector!(".postingtitletext .titletextonly, #titletextonly");
    pub(crate) static ref POST_MAP: Selector = parse_selector!("#map");
    pub(crate) static ref POST_ADDRESS: Selector = parse_selector!(".mapaddress");
    pub(crate) static ref POST_DESCRIPTION: Selector = parse_selector!("#postingbody");
    pub(crate) static ref POST_INFO_TIMES: Selector = parse_selector!(".postinginfos p > time");
}
