//! User-facing texts (Telegram HTML).

pub const USAGE_START: &str =
    "Введите номер запроса и пинкод через пробел, пример: \n\n<code>/start 1111/0000 123456</code>";
pub const USAGE_CHECK: &str =
    "Введите номер запроса и пинкод через пробел, пример: \n\n<code>/check 1111/0000 123456</code>";
pub const REGISTERED: &str = "Записан в очередь";
pub const ALREADY_REGISTERED: &str = "Уже записан";
pub const EMPTY_LIST: &str = "Список наблюдения пуст, введите /start для начала";
pub const LIST_HEADER: &str = "Текущий список наблюдения";
pub const DELETE_HEADER: &str = "Выберите элемент для удаления";
pub const NO_MORE_ITEMS: &str = "Больше нет элементов в списке наблюдения";
pub const SCRAPE_FAILED: &str = "Не получилось собрать данные";
