//! vPOS response code descriptions in the three languages the bank documents.

use crate::gateways::PaymentLanguage;

const EN: &[(&str, &str)] = &[
    ("00", "Payment successfully completed"),
    ("01", "Order with the given number is already registered"),
    ("02", "Order declined due to errors in payment details"),
    ("03", "Unknown (forbidden) currency"),
    ("04", "Required parameter of the request is missing"),
    ("05", "Error in request parameters"),
    ("06", "Unregistered OrderId"),
    ("07", "System Error"),
    ("20", "Incorrect Username and Password"),
    ("30", "Incorrect Order ID"),
    ("50", "Payment sum error"),
    ("500", "Unknown error"),
    ("510", "Incorrect parameters"),
    ("513", "Do not have Refund operation permission"),
    ("514", "Do not have Reverse operation permission"),
    ("520", "Overtime error"),
    ("550", "System Error"),
    ("560", "Operation failed"),
];

const RU: &[(&str, &str)] = &[
    ("00", "Платеж успешно завершен"),
    ("01", "Заказ с указанным номером уже зарегистрирован в системе"),
    ("02", "Заказ отклонен из-за ошибки в платежных реквизитах"),
    ("03", "Неизвестная (запрещенная) валюта"),
    ("04", "Отсутствует обязательный параметр запроса"),
    ("05", "Ошибка в значении параметра запроса"),
    ("06", "Незарегистрированный OrderId"),
    ("07", "Системная ошибка"),
    ("20", "Неверное имя пользователя или пароль"),
    ("30", "Неверный идентификатор заказа"),
    ("50", "Ошибка суммы платежа"),
    ("500", "Неизвестная ошибка"),
    ("510", "Неверные параметры"),
    ("513", "Нет разрешения на операцию Refund"),
    ("514", "Нет разрешения на операцию Reverse"),
    ("520", "Ошибка времени"),
    ("550", "Системная ошибка"),
    ("560", "Операция не удалась"),
];

const AM: &[(&str, &str)] = &[
    ("00", "Վճարումը հաջողությամբ իրականացվել է:"),
    ("01", "Նշված համարով պատվերն արդեն գրանցված է համակարգում:"),
    ("02", "Պատվերը մերժվել է վճարման վավերապայմաններում առկա սխալի պատճառով:"),
    ("03", "Անհայտ (արգելված) արժույթ"),
    ("04", "Բացակայում է հարցման պարտադիր պարամետրը:"),
    ("05", "Հարցման պարամետրի նշանակության սխալ:"),
    ("06", "Չգրանցված OrderId"),
    ("07", "Համակարգի սխալ"),
    ("20", "Օգտագործողի անունը կամ ծածկագիրը սխալ է:"),
    ("30", "Պատվերի նույնականացման համարը սխալ է:"),
    ("50", "Վճարման գումարի սխալ"),
    ("500", "Անհայտ սխալ"),
    ("510", "Սխալ պարամետրեր"),
    ("513", "Refund գործողության թույլտվություն չկա"),
    ("514", "Reverse գործողության թույլտվություն չկա"),
    ("520", "Ժամանակի սխալ"),
    ("550", "Համակարգի սխալ"),
    ("560", "Գործողությունը ձախողվել է"),
];

const RETRYABLE: &[&str] = &["07", "520", "550", "560"];

fn table(lang: PaymentLanguage) -> &'static [(&'static str, &'static str)] {
    match lang {
        PaymentLanguage::En => EN,
        PaymentLanguage::Ru => RU,
        PaymentLanguage::Am => AM,
    }
}

fn lookup(table: &'static [(&'static str, &'static str)], code: &str) -> Option<&'static str> {
    table.iter().find(|(c, _)| *c == code).map(|(_, m)| *m)
}

/// Localised description, English when the language lacks the code.
pub fn describe(code: &str, lang: PaymentLanguage) -> String {
    let code = code.trim();
    lookup(table(lang), code)
        .or_else(|| lookup(EN, code))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unknown error code: {code}"))
}

/// System errors and timeouts on the bank side.
pub fn is_retryable(code: &str) -> bool {
    RETRYABLE.contains(&code.trim())
}
